//! st_crypto — Shadowtrail cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize derived key material on drop; passphrases are borrowed per call
//!   and never stored.
//! - Both value ciphers share one self-describing envelope format, so a
//!   stored value carries everything needed to decrypt it except the key.
//!
//! # Module layout
//! - `keycheck` — passphrase strength gate (length, character classes, weak list)
//! - `kdf`      — PBKDF2-SHA256 derivation + per-value salt generation
//! - `envelope` — `salt:iv:tag:ciphertext` hex wire format
//! - `aead`     — AES-256-GCM cipher for application-written values
//! - `trigger`  — Rust twin of the cipher the generated DB triggers run
//! - `naming`   — deterministic table / column pseudonyms
//! - `error`    — unified error type

pub mod aead;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keycheck;
pub mod naming;
pub mod trigger;

pub use envelope::CipherEnvelope;
pub use error::CryptoError;
pub use keycheck::validate_key;
