use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Weak encryption key rejected: {0}")]
    WeakKey(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Decryption failed (wrong key or corrupted data)")]
    BadKeyOrCorrupt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Cipher failure: {0}")]
    Cipher(String),
}
