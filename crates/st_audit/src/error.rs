use thiserror::Error;

use crate::events::SetupStep;
use st_crypto::CryptoError;
use st_dialect::DialectError;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table {0} has no columns")]
    NoColumns(String),

    #[error("Column parity violated for {table}: {detail}")]
    IntegrityViolation { table: String, detail: String },

    #[error("DDL execution failed while {step}: {source}")]
    DdlExecution {
        step: SetupStep,
        #[source]
        source: DialectError,
    },

    #[error("Metadata store error: {0}")]
    Metadata(String),
}

impl AuditError {
    /// True when the failure means "the key is wrong", as opposed to any
    /// infrastructure problem. Callers use this to word user feedback.
    pub fn is_bad_key(&self) -> bool {
        matches!(
            self,
            AuditError::Crypto(CryptoError::BadKeyOrCorrupt)
                | AuditError::Crypto(CryptoError::WeakKey(_))
        )
    }
}
