//! st_audit — encrypted audit trail engine
//!
//! Given an existing table and an encryption key, this crate derives a
//! shadow table whose column names and values are encrypted, installs
//! database triggers that populate it on every INSERT/UPDATE/DELETE, and
//! reads it back into plaintext rows. Nothing in the application that
//! writes to the original table changes.
//!
//! Three pieces have to stay consistent for that to hold: the application
//! cipher ([`st_crypto::aead`]), the SQL the generator emits into trigger
//! bodies (mirrored by [`st_crypto::trigger`]), and the read path that
//! re-derives pseudonyms from the current catalog. The canonical column
//! order lives in [`plan::AuditPlan`] and is computed exactly once per
//! setup; both the CREATE TABLE and every trigger INSERT are rendered from
//! it.
//!
//! # Module layout
//! - `plan`         — canonical column order + parity checks
//! - `generator`    — per-dialect DDL / trigger text (mysql, postgres)
//! - `metadata`     — encrypted-name ↔ original-name mapping table
//! - `orchestrator` — setup / batch setup / removal state machine
//! - `reader`       — discovery, paged reads, decryption, key probing
//! - `config`       — schema qualifier, actor tag, batch pacing
//! - `events`       — structured operational events
//! - `error`        — unified error type

pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod reader;

pub use config::{AuditConfig, BatchPolicy};
pub use error::AuditError;
pub use events::{SetupStatus, SetupStep};
pub use metadata::MetadataStore;
pub use orchestrator::{AuditOrchestrator, RemoveOutcome, SetupResult};
pub use plan::AuditPlan;
pub use reader::{
    AuditReader, AuditTableInfo, DecryptedPage, DecryptedRecord, EncryptedPage, FieldOutcome,
    KeyCheck,
};
