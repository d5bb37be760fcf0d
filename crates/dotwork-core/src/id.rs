//! Typed entity identifiers and SHA-256 + base36 generation.
//!
//! Every persisted entity carries an id of the form `<prefix>-<hash>@<short>`
//! where `hash` is base36 and `short` is an 8-hex display suffix. Ids travel
//! through the system as [`EntityId`] values, never as raw strings, so the
//! length bound and character set are enforced in exactly one place.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Maximum total length of an entity id.
pub const MAX_ID_LEN: usize = 40;

/// Length of the hex display suffix after `@`.
pub const SHORT_LEN: usize = 8;

/// Well-known id prefixes, one per entity type.
pub mod prefix {
    pub const ISSUE: &str = "issue";
    pub const EPIC: &str = "epic";
    pub const PROJECT: &str = "project";
    pub const COMMENT: &str = "comment";
    pub const BULK: &str = "bulk";
    pub const AUDIT: &str = "audit";
}

/// Errors from parsing or generating entity ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The id exceeds [`MAX_ID_LEN`] characters.
    #[error("id exceeds {MAX_ID_LEN} characters (got {0})")]
    TooLong(usize),

    /// The id does not match `<prefix>-<hash>@<short>`.
    #[error("malformed id: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A validated entity identifier: `<prefix>-<base36 hash>@<8 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    /// Parses and validates an id string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.len() > MAX_ID_LEN {
            return Err(IdError::TooLong(s.len()));
        }
        let (head, short) = s
            .rsplit_once('@')
            .ok_or_else(|| IdError::Malformed(s.to_owned()))?;
        let (prefix, hash) = head
            .split_once('-')
            .ok_or_else(|| IdError::Malformed(s.to_owned()))?;

        let prefix_ok = !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_lowercase());
        let hash_ok = !hash.is_empty()
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());
        let short_ok = short.len() == SHORT_LEN
            && short
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'a'..=b'f'));

        if !(prefix_ok && hash_ok && short_ok) {
            return Err(IdError::Malformed(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }

    /// The entity-type prefix (e.g., "issue").
    pub fn prefix(&self) -> &str {
        self.0.split_once('-').map(|(p, _)| p).unwrap_or("")
    }

    /// The base36 hash between `-` and `@`.
    pub fn hash(&self) -> &str {
        let head = self.0.rsplit_once('@').map(|(h, _)| h).unwrap_or("");
        head.split_once('-').map(|(_, h)| h).unwrap_or("")
    }

    /// The 8-hex display suffix after `@`.
    pub fn short(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, s)| s).unwrap_or("")
    }

    /// Returns `true` if the id carries the given prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefix() == prefix
    }

    /// The full id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Base36 encoding
// ---------------------------------------------------------------------------

/// Renders `data` as a fixed-width base36 string (digits 0-9 then a-z).
///
/// The value is interpreted big-endian and taken modulo `36^width`: digit
/// slots fill from the right, so inputs with more entropy than the width
/// holds lose their high end, and shorter inputs leave the left slots at
/// `'0'`. The output is always exactly `width` characters.
pub fn encode_base36(data: &[u8], width: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut out = vec![b'0'; width];
    let mut value = BigUint::from_bytes_be(data);
    let base = BigUint::from(36u32);

    for slot in out.iter_mut().rev() {
        if value.is_zero() {
            break;
        }
        let digit = (&value % &base).to_u32_digits().first().copied().unwrap_or(0);
        *slot = DIGITS[digit as usize];
        value /= &base;
    }

    String::from_utf8(out).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Default base36 hash length. 12 chars carry ~62 bits, keeping collision
/// odds within a project well below 1e-9 for any realistic issue count.
pub const DEFAULT_HASH_LEN: usize = 12;

/// Generates entity ids from a monotonic counter mixed with per-process
/// randomness through SHA-256.
#[derive(Debug)]
pub struct IdGenerator {
    counter: AtomicU64,
    seed: u64,
    hash_len: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_LEN)
    }
}

impl IdGenerator {
    /// Creates a generator producing hashes of `hash_len` base36 chars
    /// (clamped to 3..=16).
    pub fn new(hash_len: usize) -> Self {
        let hash_len = hash_len.clamp(3, 16);
        let seed = u64::from(std::process::id())
            ^ Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64;
        Self {
            counter: AtomicU64::new(0),
            seed,
            hash_len,
        }
    }

    /// Produces the next id for the given prefix.
    pub fn next(&self, prefix: &str) -> EntityId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let ts = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let content = format!("{prefix}|{n}|{ts}|{}", self.seed);
        let digest = Sha256::digest(content.as_bytes());

        // 8 digest bytes cover 16 base36 chars comfortably.
        let hash = encode_base36(&digest[..8], self.hash_len);
        let short: String = digest[8..12].iter().map(|b| format!("{b:02x}")).collect();

        EntityId(format!("{prefix}-{hash}@{short}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed() {
        let id = EntityId::parse("issue-abc123@12ef34ab").unwrap();
        assert_eq!(id.prefix(), "issue");
        assert_eq!(id.hash(), "abc123");
        assert_eq!(id.short(), "12ef34ab");
        assert!(id.has_prefix("issue"));
    }

    #[test]
    fn parse_rejects_missing_parts() {
        assert!(EntityId::parse("issue-abc123").is_err());
        assert!(EntityId::parse("issueabc@12ef34ab").is_err());
        assert!(EntityId::parse("-abc@12ef34ab").is_err());
        assert!(EntityId::parse("issue-@12ef34ab").is_err());
    }

    #[test]
    fn parse_rejects_bad_short() {
        // Wrong length.
        assert!(EntityId::parse("issue-abc@12ef").is_err());
        // Non-hex.
        assert!(EntityId::parse("issue-abc@12ef34zz").is_err());
    }

    #[test]
    fn parse_rejects_too_long() {
        let long = format!("issue-{}@12ef34ab", "a".repeat(40));
        assert!(matches!(EntityId::parse(&long), Err(IdError::TooLong(_))));
    }

    #[test]
    fn parse_rejects_uppercase_hash() {
        assert!(EntityId::parse("issue-ABC123@12ef34ab").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let id = EntityId::parse("epic-0k3j9x@00ff00ff").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn encode_base36_length() {
        assert_eq!(encode_base36(&[], 4), "0000");
        assert_eq!(encode_base36(&[0xFF, 0xFF], 4).len(), 4);
        assert_eq!(encode_base36(&[0xFF, 0xFF, 0xFF, 0xFF], 3).len(), 3);
    }

    #[test]
    fn generator_format_and_length() {
        let generator = IdGenerator::default();
        let id = generator.next(prefix::ISSUE);
        assert!(id.has_prefix("issue"));
        assert_eq!(id.hash().len(), DEFAULT_HASH_LEN);
        assert_eq!(id.short().len(), SHORT_LEN);
        assert!(id.as_str().len() <= MAX_ID_LEN);
        // Must reparse cleanly.
        EntityId::parse(id.as_str()).unwrap();
    }

    #[test]
    fn generator_ids_are_distinct() {
        let generator = IdGenerator::default();
        let a = generator.next(prefix::ISSUE);
        let b = generator.next(prefix::ISSUE);
        assert_ne!(a, b);
    }

    #[test]
    fn generator_clamps_hash_len() {
        let generator = IdGenerator::new(99);
        let id = generator.next(prefix::BULK);
        assert_eq!(id.hash().len(), 16);
        assert!(id.as_str().len() <= MAX_ID_LEN);
    }
}
