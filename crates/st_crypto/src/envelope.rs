//! Envelope wire format
//!
//! Every encrypted value is stored as four lowercase-hex fields joined by
//! colons:
//!
//! ```text
//! hex(salt) : hex(iv) : hex(tag) : hex(ciphertext)
//!   32 B        16 B     16 B       0..n B
//! ```
//!
//! The format is deliberately dumb: both the application cipher and the SQL
//! emitted into triggers can produce it with string concatenation, and a
//! reader can validate structure without any key material.

use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

pub const SALT_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// Parsed form of one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    /// Parse `salt:iv:tag:ciphertext`. Structural problems (wrong part
    /// count, bad hex, wrong field sizes) are [`CryptoError::MalformedEnvelope`];
    /// they are distinct from authentication failures so callers can tell
    /// "not an envelope" from "wrong key".
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 4 {
            return Err(CryptoError::MalformedEnvelope(format!(
                "expected 4 colon-separated parts, found {}",
                parts.len()
            )));
        }

        let salt = fixed_field::<SALT_LEN>(parts[0], "salt")?;
        let iv = fixed_field::<IV_LEN>(parts[1], "iv")?;
        let tag = fixed_field::<TAG_LEN>(parts[2], "tag")?;
        let ciphertext = hex::decode(parts[3])
            .map_err(|_| CryptoError::MalformedEnvelope("ciphertext is not valid hex".into()))?;

        Ok(Self {
            salt,
            iv,
            tag,
            ciphertext,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            hex::encode(self.salt),
            hex::encode(self.iv),
            hex::encode(self.tag),
            hex::encode(&self.ciphertext)
        )
    }

    /// Cheap structural check without allocating the parsed form.
    pub fn looks_like_envelope(text: &str) -> bool {
        let mut parts = text.split(':');
        let ok = |p: Option<&str>, len: usize| {
            p.map(|s| s.len() == len * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()))
                .unwrap_or(false)
        };
        ok(parts.next(), SALT_LEN)
            && ok(parts.next(), IV_LEN)
            && ok(parts.next(), TAG_LEN)
            && parts.next().is_some()
            && parts.next().is_none()
    }
}

impl fmt::Display for CipherEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CipherEnvelope {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn fixed_field<const N: usize>(part: &str, name: &str) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(part)
        .map_err(|_| CryptoError::MalformedEnvelope(format!("{name} is not valid hex")))?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::MalformedEnvelope(format!("{name} must be {N} bytes, got {}", bytes.len()))
    })
}

/// Fresh random 16-byte IV, one per encrypted value.
pub fn generate_iv() -> [u8; IV_LEN] {
    use rand::RngCore;
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}
