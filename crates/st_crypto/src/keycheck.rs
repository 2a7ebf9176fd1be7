//! Encryption key validation
//!
//! Gate applied before any key-dependent operation. Rejections name the
//! failed rule (never the key itself) so callers can surface a precise
//! message. Rules, in the order they are checked:
//!
//! 1. length between [`MIN_KEY_LEN`] and [`MAX_KEY_LEN`] characters
//! 2. at least two character classes (upper, lower, digit, symbol)
//! 3. not on the known-weak list (case-insensitive)
//! 4. no run of 4+ identical characters
//! 5. no obvious keyboard / counting sequence (case-insensitive)

use crate::error::CryptoError;

pub const MIN_KEY_LEN: usize = 12;
pub const MAX_KEY_LEN: usize = 128;

/// Longest allowed run of one repeated character is one less than this.
const MAX_REPEAT_RUN: usize = 4;

/// Known-weak values, matched case-insensitively against the whole key.
const WEAK_KEYS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "p@ssw0rd",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "admin",
    "administrator",
    "root",
    "letmein",
    "welcome",
    "welcome1",
    "iloveyou",
    "monkey",
    "dragon",
    "sunshine",
    "princess",
    "football",
    "master",
    "shadow",
    "superman",
    "trustno1",
    "changeme",
    "secret",
];

/// Ascending keyboard / counting runs; a key containing any of these
/// (case-folded) is rejected.
const SEQUENCES: &[&str] = &[
    "0123", "1234", "2345", "3456", "4567", "5678", "6789", "7890", "abcd", "bcde", "cdef",
    "defg", "efgh", "qwer", "wert", "erty", "asdf", "sdfg", "zxcv", "xcvb",
];

/// Check a passphrase against all rules. `Err(WeakKey)` names the first
/// rule that failed.
pub fn validate_key(key: &str) -> Result<(), CryptoError> {
    let len = key.chars().count();
    if len < MIN_KEY_LEN {
        return Err(CryptoError::WeakKey(format!(
            "key must be at least {MIN_KEY_LEN} characters (got {len})"
        )));
    }
    if len > MAX_KEY_LEN {
        return Err(CryptoError::WeakKey(format!(
            "key must be at most {MAX_KEY_LEN} characters (got {len})"
        )));
    }

    if character_classes(key) < 2 {
        return Err(CryptoError::WeakKey(
            "key needs at least 2 of: uppercase, lowercase, digits, symbols".into(),
        ));
    }

    let folded = key.to_lowercase();
    if WEAK_KEYS.contains(&folded.as_str()) {
        return Err(CryptoError::WeakKey("key is on the known-weak list".into()));
    }

    if has_repeat_run(key) {
        return Err(CryptoError::WeakKey(format!(
            "key contains {MAX_REPEAT_RUN}+ repeated characters in a row"
        )));
    }

    if let Some(seq) = SEQUENCES.iter().find(|s| folded.contains(*s)) {
        return Err(CryptoError::WeakKey(format!(
            "key contains an obvious sequence ({seq})"
        )));
    }

    Ok(())
}

/// Count distinct character classes present (max 4). Anything that is not
/// alphanumeric counts as a symbol.
fn character_classes(key: &str) -> usize {
    let mut upper = false;
    let mut lower = false;
    let mut digit = false;
    let mut symbol = false;
    for c in key.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_ascii_digit() {
            digit = true;
        } else {
            symbol = true;
        }
    }
    [upper, lower, digit, symbol].iter().filter(|b| **b).count()
}

fn has_repeat_run(key: &str) -> bool {
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in key.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= MAX_REPEAT_RUN {
                return true;
            }
        } else {
            run = 1;
            prev = Some(c);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(key: &str) -> bool {
        validate_key(key).is_err()
    }

    #[test]
    fn rejects_short_keys() {
        assert!(rejected("short"));
        assert!(rejected("elevenchars"));
    }

    #[test]
    fn rejects_single_class() {
        // 12 chars but all lowercase
        assert!(rejected("abglmqrstuvw"));
    }

    #[test]
    fn rejects_known_weak_regardless_of_case() {
        // long enough and two classes, so only the weak list can catch it
        assert!(rejected("AdMiNiStRaToR"));
    }

    #[test]
    fn common_passwords_never_pass() {
        assert!(rejected("password123"));
        assert!(rejected("qwerty123"));
        assert!(rejected("letmein"));
    }

    #[test]
    fn rejects_repeat_runs() {
        assert!(rejected("aaaaaaaaaaaa"));
        assert!(rejected("Go0d!but#aaaa"));
    }

    #[test]
    fn rejects_embedded_sequences() {
        assert!(rejected("X9!k1234pQz&f"));
        assert!(rejected("X9!kABCDpQz&f"));
    }

    #[test]
    fn accepts_strong_keys() {
        assert!(validate_key("Tr0ub4dor&3!").is_ok());
        assert!(validate_key("Sup3r$ecret99").is_ok());
        assert!(validate_key("correct-Horse-battery-9").is_ok());
    }

    #[test]
    fn error_message_names_the_rule_not_the_key() {
        let err = validate_key("short").unwrap_err().to_string();
        assert!(err.contains("at least 12"));
        assert!(!err.contains("short\""));
    }
}
