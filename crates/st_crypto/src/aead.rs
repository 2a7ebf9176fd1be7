//! Application-side authenticated encryption
//!
//! AES-256-GCM over the envelope format, used for every value the Rust side
//! writes itself (metadata names, re-encrypted reads). Layout of one value:
//!
//! ```text
//! key   = PBKDF2-SHA256(passphrase, salt, 100k rounds)
//! ct, tag = AES-256-GCM(key, iv, plaintext)      iv = 16 random bytes
//! value = hex(salt):hex(iv):hex(tag):hex(ct)
//! ```
//!
//! The 16-byte IV is longer than GCM's native 96 bits; the cipher is
//! instantiated with a 16-byte nonce size so the IV feeds GHASH directly
//! instead of being truncated. Values captured inside the database use the
//! companion scheme in [`crate::trigger`]; the two share the envelope shape
//! but are not mutually decryptable.

use aes::Aes256;
use aes_gcm::{
    aead::generic_array::{typenum::U16, GenericArray},
    AeadInPlace, AesGcm, KeyInit,
};

use crate::envelope::{generate_iv, CipherEnvelope, TAG_LEN};
use crate::error::CryptoError;
use crate::kdf;

/// AES-256-GCM with a 16-byte nonce (envelope IV size).
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Encrypt one value under a fresh salt + IV.
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CryptoError> {
    let salt = kdf::generate_salt();
    let iv = generate_iv();
    let derived = kdf::derive_key(key, &salt);

    let cipher = Aes256Gcm16::new_from_slice(derived.as_bytes())
        .map_err(|_| CryptoError::Cipher("AEAD key init".into()))?;

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
        .map_err(|_| CryptoError::Cipher("AEAD encrypt".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(CipherEnvelope {
        salt,
        iv,
        tag: tag_bytes,
        ciphertext: buffer,
    }
    .encode())
}

/// Decrypt one envelope. Structural problems surface as
/// [`CryptoError::MalformedEnvelope`]; a failed authentication tag (wrong
/// key, or ciphertext produced by the trigger scheme) surfaces as
/// [`CryptoError::BadKeyOrCorrupt`].
pub fn decrypt(value: &str, key: &str) -> Result<String, CryptoError> {
    let env = CipherEnvelope::parse(value)?;
    let derived = kdf::derive_key(key, &env.salt);

    let cipher = Aes256Gcm16::new_from_slice(derived.as_bytes())
        .map_err(|_| CryptoError::Cipher("AEAD key init".into()))?;

    let mut buffer = env.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&env.iv),
            b"",
            &mut buffer,
            GenericArray::from_slice(&env.tag),
        )
        .map_err(|_| CryptoError::BadKeyOrCorrupt)?;

    String::from_utf8(buffer).map_err(|_| CryptoError::BadKeyOrCorrupt)
}

/// NULL in, NULL out; SQL NULL is never encrypted into a value.
pub fn encrypt_nullable(plaintext: Option<&str>, key: &str) -> Result<Option<String>, CryptoError> {
    plaintext.map(|p| encrypt(p, key)).transpose()
}

pub fn decrypt_nullable(value: Option<&str>, key: &str) -> Result<Option<String>, CryptoError> {
    value.map(|v| decrypt(v, key)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "Sup3r$ecret99";

    #[test]
    fn round_trip() {
        let stored = encrypt("a@b.com", KEY).unwrap();
        assert_eq!(decrypt(&stored, KEY).unwrap(), "a@b.com");
    }

    #[test]
    fn round_trip_empty_and_unicode() {
        for plaintext in ["", "héllo wörld ✓", "line\nbreak\tand tab"] {
            let stored = encrypt(plaintext, KEY).unwrap();
            assert_eq!(decrypt(&stored, KEY).unwrap(), plaintext);
        }
    }

    #[test]
    fn fresh_salt_and_iv_per_call() {
        let a = encrypt("same input", KEY).unwrap();
        let b = encrypt("same input", KEY).unwrap();
        assert_ne!(a, b);
        // both still decrypt
        assert_eq!(decrypt(&a, KEY).unwrap(), decrypt(&b, KEY).unwrap());
    }

    #[test]
    fn wrong_key_is_detected() {
        let stored = encrypt("a@b.com", KEY).unwrap();
        let err = decrypt(&stored, "Wr0ng&key!xyz").unwrap_err();
        assert!(matches!(err, CryptoError::BadKeyOrCorrupt));
    }

    #[test]
    fn tampered_ciphertext_is_detected() {
        let stored = encrypt("a@b.com", KEY).unwrap();
        let mut env = CipherEnvelope::parse(&stored).unwrap();
        env.ciphertext[0] ^= 0x01;
        let err = decrypt(&env.encode(), KEY).unwrap_err();
        assert!(matches!(err, CryptoError::BadKeyOrCorrupt));
    }

    #[test]
    fn malformed_input_is_not_a_key_error() {
        let err = decrypt("not-an-envelope", KEY).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
    }

    #[test]
    fn nullable_helpers_pass_none_through() {
        assert_eq!(encrypt_nullable(None, KEY).unwrap(), None);
        assert_eq!(decrypt_nullable(None, KEY).unwrap(), None);
        let stored = encrypt_nullable(Some("x"), KEY).unwrap().unwrap();
        assert_eq!(decrypt_nullable(Some(&stored), KEY).unwrap().unwrap(), "x");
    }
}
