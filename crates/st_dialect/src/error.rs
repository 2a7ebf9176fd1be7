use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialectError {
    #[error("Unsupported dialect: {0:?} (expected \"mysql\" or \"postgres\")")]
    Unsupported(String),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Parameter bind failed: {0}")]
    Bind(String),

    #[error("Row decode failed: {0}")]
    Decode(String),
}
