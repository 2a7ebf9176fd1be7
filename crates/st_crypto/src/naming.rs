//! Deterministic pseudonyms for audited tables and columns
//!
//! Names are truncated SHA-256 digests over (name, key), so a generator run
//! weeks later still targets the same shadow schema without looking anything
//! up, while two different keys produce unlinkable schemas. Pseudonyms stay
//! within identifier limits everywhere: `enc_` + 12 hex chars for columns,
//! `aud_` + 32 hex chars for tables.

use sha2::{Digest, Sha256};

/// Prefix on every encrypted column pseudonym.
pub const COLUMN_PREFIX: &str = "enc_";
/// Prefix on every shadow table name; discovery filters on it.
pub const TABLE_PREFIX: &str = "aud_";
/// Extra tag mixed into table hashing so a table and a column sharing a name
/// still get unrelated pseudonyms.
const TABLE_TAG: &str = "audit";

const COLUMN_HEX_LEN: usize = 12;
const TABLE_HEX_LEN: usize = 32;

/// Logical names of the three audit columns, in the fixed order the shadow
/// schema appends them after the source columns.
pub const AUDIT_ACTOR: &str = "audit_actor";
pub const AUDIT_TIMESTAMP: &str = "audit_timestamp";
pub const AUDIT_OPERATION: &str = "audit_operation";

pub fn derive_column_name(original: &str, key: &str) -> String {
    let digest = Sha256::digest(format!("{original}{key}").as_bytes());
    format!("{COLUMN_PREFIX}{}", &hex::encode(digest)[..COLUMN_HEX_LEN])
}

pub fn derive_table_name(original: &str, key: &str) -> String {
    let digest = Sha256::digest(format!("{original}{key}{TABLE_TAG}").as_bytes());
    format!("{TABLE_PREFIX}{}", &hex::encode(digest)[..TABLE_HEX_LEN])
}

/// Pseudonyms of (actor, timestamp, operation), in schema order.
pub fn audit_triple(key: &str) -> [String; 3] {
    [
        derive_column_name(AUDIT_ACTOR, key),
        derive_column_name(AUDIT_TIMESTAMP, key),
        derive_column_name(AUDIT_OPERATION, key),
    ]
}

/// Source-table stub used inside trigger and routine names. Routine names
/// carry fixed prefixes and suffixes on top of this, so overlong tables fall
/// back to a digest to keep every derived name within the 64-character
/// identifier limit.
pub fn table_stub(original: &str) -> String {
    const MAX_STUB: usize = 40;
    if original.len() <= MAX_STUB {
        original.to_string()
    } else {
        let digest = Sha256::digest(original.as_bytes());
        format!("t{}", &hex::encode(digest)[..16])
    }
}
