//! Key derivation
//!
//! PBKDF2-HMAC-SHA256 turns the caller's passphrase plus a per-value salt
//! into the 32-byte key the application cipher uses. The iteration count is
//! part of the stored-data contract: values written under one count will not
//! decrypt under another, so treat a change as a format break.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::envelope::SALT_LEN;

pub const PBKDF2_ROUNDS: u32 = 100_000;
pub const DERIVED_KEY_LEN: usize = 32;

/// 32-byte key derived from (passphrase, salt). Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey(pub [u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

/// Derive the application cipher key for one value.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> DerivedKey {
    let mut output = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut output);
    DerivedKey(output)
}

/// Fresh random salt, one per encrypted value (stored in the envelope).
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
