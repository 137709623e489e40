//! Version-qualified object keys and version-ID generation.
//!
//! Every object record in a bucket index lives under
//! `<name> 0x07 <instance>`. The null-version record (written while the
//! bucket was unversioned) uses the empty instance, so its key ends with
//! the separator and sorts before every versioned key of the same name.
//!
//! A version ID is 31 characters: an 8-character base62 encoding of
//! `MAX_TS - milliseconds_since_epoch` followed by 23 random
//! alphanumerics. Because the timestamp is inverted and base62 digits are
//! in ASCII order, version IDs of one name sort newest-first, which is
//! exactly the order listings need with no secondary sort.

use chrono::Utc;
use rand::Rng;

use crate::error::{CoreError, CoreResult};

/// Reserved byte between the object name and the version instance.
pub const KEY_SEP: u8 = 0x07;

/// Width of the base62 timestamp prefix.
pub const VERSION_TS_LEN: usize = 8;

/// Width of the random suffix.
pub const VERSION_RAND_LEN: usize = 23;

/// Largest millisecond count an 8-character base62 field can carry:
/// `62^8 - 1`.
pub const MAX_TS: u64 = 218_340_105_584_895;

/// Base62 digits in ASCII (and therefore lexicographic) order.
const BASE62: [u8; 62] = *b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Bucket-index key for `(name, instance)`. The null version passes the
/// empty instance; an instance of `"null"` is the wire spelling of the
/// null version and maps to the same key.
#[must_use]
pub fn entry_key(name: &str, instance: &str) -> Vec<u8> {
    let instance = normalize_instance(instance);
    let mut key = Vec::with_capacity(name.len() + 1 + instance.len());
    key.extend_from_slice(name.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(instance.as_bytes());
    key
}

/// The common prefix of every version of `name` (name plus separator).
#[must_use]
pub fn entry_key_prefix(name: &str) -> Vec<u8> {
    entry_key(name, "")
}

/// Split a bucket-index key back into `(name, instance)`.
///
/// # Errors
///
/// [`CoreError::Decode`] when the separator is missing or either side is
/// not UTF-8.
pub fn split_entry_key(key: &[u8]) -> CoreResult<(String, String)> {
    let sep = key
        .iter()
        .rposition(|&b| b == KEY_SEP)
        .ok_or_else(|| CoreError::decode("object key lacks version separator"))?;
    let name = std::str::from_utf8(&key[..sep])
        .map_err(|_| CoreError::decode("object name is not UTF-8"))?;
    let instance = std::str::from_utf8(&key[sep + 1..])
        .map_err(|_| CoreError::decode("version instance is not UTF-8"))?;
    Ok((name.to_owned(), instance.to_owned()))
}

/// Map the wire spelling `"null"` to the stored empty instance.
#[must_use]
pub fn normalize_instance(instance: &str) -> &str {
    if instance == "null" { "" } else { instance }
}

/// Encode `value` in base62, left-padded with `'0'` to `pad` characters.
#[must_use]
pub fn base62_encode(value: u64, pad: usize) -> String {
    let mut digits = Vec::new();
    let mut value = value;
    if value == 0 {
        digits.push(BASE62[0]);
    }
    while value > 0 {
        digits.push(BASE62[(value % 62) as usize]);
        value /= 62;
    }
    while digits.len() < pad {
        digits.push(BASE62[0]);
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Decode a base62 string produced by [`base62_encode`].
#[must_use]
pub fn base62_decode(s: &str) -> Option<u64> {
    let mut value: u64 = 0;
    for b in s.bytes() {
        let digit = BASE62.iter().position(|&c| c == b)?;
        value = value.checked_mul(62)?.checked_add(digit as u64)?;
    }
    Some(value)
}

/// Generate a fresh version ID for the given wall-clock millisecond
/// timestamp.
#[must_use]
pub fn generate_version_id(now_ms: u64) -> String {
    let inverted = MAX_TS.saturating_sub(now_ms);
    let mut id = base62_encode(inverted, VERSION_TS_LEN);
    id.push_str(&random_alphanumeric(VERSION_RAND_LEN));
    id
}

/// Generate a version ID stamped with the current wall clock.
#[must_use]
pub fn generate_version_id_now() -> String {
    generate_version_id(Utc::now().timestamp_millis().max(0) as u64)
}

/// Recover the millisecond timestamp a version ID was generated at.
#[must_use]
pub fn version_id_timestamp_ms(version_id: &str) -> Option<u64> {
    if version_id.len() < VERSION_TS_LEN {
        return None;
    }
    let inverted = base62_decode(&version_id[..VERSION_TS_LEN])?;
    Some(MAX_TS - inverted)
}

/// A random string over `0-9A-Za-z`.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE62[rng.random_range(0..BASE62.len())] as char)
        .collect()
}
