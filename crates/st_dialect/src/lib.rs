//! st_dialect — SQL dialect abstraction
//!
//! Everything above this crate speaks one vocabulary: [`SqlAdapter`] for
//! execution, [`SqlValue`] / [`SqlRow`] for data, [`Dialect`] for the
//! handful of syntax points where MySQL and PostgreSQL disagree (identifier
//! quoting, placeholders). The audit engine builds SQL text against a
//! `Dialect` and runs it through an adapter; nothing above here touches a
//! driver type.
//!
//! # Module layout
//! - `dialect` — [`Dialect`] enum, quoting and placeholder rules
//! - `value`   — driver-independent values and rows
//! - `adapter` — the [`SqlAdapter`] trait
//! - `ident`   — identifier allow-list validation
//! - `catalog` — information_schema lookups (columns, table existence)
//! - `mysql`   — sqlx MySQL adapter
//! - `postgres`— sqlx PostgreSQL adapter
//! - `error`   — unified error type

pub mod adapter;
pub mod catalog;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod mysql;
pub mod postgres;
pub mod value;

pub use adapter::SqlAdapter;
pub use dialect::Dialect;
pub use error::DialectError;
pub use value::{SqlRow, SqlValue};
