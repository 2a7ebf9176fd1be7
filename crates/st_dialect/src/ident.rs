//! Identifier allow-list.
//!
//! User-supplied table and column names end up inside generated DDL and
//! trigger bodies where they cannot always be bound as parameters, so they
//! pass a strict allow-list first: ASCII letter or underscore, then letters,
//! digits, underscores, at most [`MAX_IDENT_LEN`] characters total. Anything
//! else is rejected before any SQL text is built.

use crate::error::DialectError;

pub const MAX_IDENT_LEN: usize = 64;

pub fn validate_identifier(name: &str) -> Result<(), DialectError> {
    if name.is_empty() || name.len() > MAX_IDENT_LEN {
        return Err(DialectError::InvalidIdentifier(name.to_string()));
    }
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DialectError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Escape LIKE metacharacters so a prefix match stays a prefix match.
pub fn like_escape(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
