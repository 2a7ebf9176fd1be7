//! Rust twin of the in-database trigger cipher
//!
//! The database engine cannot run PBKDF2-GCM, so values captured by the
//! generated triggers use a scheme both MySQL and PostgreSQL express with
//! built-ins, mirrored here bit-for-bit so the read path can invert it:
//!
//! ```text
//! secret = SHA256(passphrase || "shadowtrail:trigger:v1")   (hex, embedded in routine source)
//! key    = SHA256(secret || salt)                            salt = 32 random bytes per value
//! ct     = AES-256-CBC/PKCS7(key, iv, plaintext)             iv = 16 random bytes
//! tag    = SHA256(key || iv || ct)[..16]
//! value  = hex(salt):hex(iv):hex(tag):hex(ct)
//! ```
//!
//! MySQL realises this with RANDOM_BYTES / SHA2 / AES_ENCRYPT under
//! block_encryption_mode 'aes-256-cbc'; PostgreSQL with pgcrypto
//! gen_random_bytes / digest / encrypt_iv('aes-cbc/pad:pkcs'). Only the
//! folded secret ever appears in routine source, never the passphrase. The
//! single SHA-256 key fold is the price of running inside a trigger; the
//! tag check still rejects wrong keys and bit flips before unpadding.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::envelope::{generate_iv, CipherEnvelope, TAG_LEN};
use crate::error::CryptoError;
use crate::kdf::generate_salt;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Domain separator folded into the secret so the embedded value is useless
/// outside this scheme.
const SECRET_TAG: &[u8] = b"shadowtrail:trigger:v1";

/// Secret embedded (as hex) in generated trigger / function source.
pub fn table_secret(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(SECRET_TAG);
    hasher.finalize().into()
}

/// Hex form of [`table_secret`], the exact literal the SQL generators embed.
pub fn table_secret_hex(key: &str) -> String {
    hex::encode(table_secret(key))
}

fn value_key(secret: &[u8; 32], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(salt);
    hasher.finalize().into()
}

fn value_tag(key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(iv);
    hasher.update(ciphertext);
    let digest = hasher.finalize();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

/// Encrypt exactly as a generated trigger would. Production writes happen in
/// the database; this path exists for the read side's self-checks and tests.
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CryptoError> {
    let secret = table_secret(key);
    let salt = generate_salt();
    let iv = generate_iv();
    let vkey = value_key(&secret, &salt);

    let enc = Aes256CbcEnc::new_from_slices(&vkey, &iv)
        .map_err(|_| CryptoError::Cipher("CBC key/iv init".into()))?;
    let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    let tag = value_tag(&vkey, &iv, &ciphertext);

    Ok(CipherEnvelope {
        salt,
        iv,
        tag,
        ciphertext,
    }
    .encode())
}

/// Decrypt a trigger-written value. The tag is checked before any unpadding,
/// so a wrong key or a flipped bit is always [`CryptoError::BadKeyOrCorrupt`]
/// rather than a padding error.
pub fn decrypt(value: &str, key: &str) -> Result<String, CryptoError> {
    let env = CipherEnvelope::parse(value)?;
    let secret = table_secret(key);
    let vkey = value_key(&secret, &env.salt);

    let expected = value_tag(&vkey, &env.iv, &env.ciphertext);
    if !bool::from(expected.as_slice().ct_eq(env.tag.as_slice())) {
        return Err(CryptoError::BadKeyOrCorrupt);
    }

    let dec = Aes256CbcDec::new_from_slices(&vkey, &env.iv)
        .map_err(|_| CryptoError::Cipher("CBC key/iv init".into()))?;
    let plaintext = dec
        .decrypt_padded_vec_mut::<Pkcs7>(&env.ciphertext)
        .map_err(|_| CryptoError::BadKeyOrCorrupt)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::BadKeyOrCorrupt)
}
