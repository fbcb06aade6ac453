//! Record key extraction and pluggable hashing.
//!
//! A record's key is a fixed-width digest of its first `hash_fields`
//! delimiter-separated fields. Key derivation is a pure function of field
//! content: the same line produces the same key in every engine, which is
//! what makes the fast, safe and disk strategies interchangeable.
//!
//! The digest backend is selected once at startup and injected into the
//! extractor; all engines in one run share it.

use std::sync::Arc;

use crate::config::EngineConfig;

/// Width of a record key in bytes (128 bits).
pub const KEY_WIDTH: usize = 16;

/// Fixed-width hash key acting as the equality proxy for a record's
/// leading fields.
pub type Key = [u8; KEY_WIDTH];

/// Separator used when concatenating key fields before hashing.
///
/// ASCII unit separator: must never equal the configured field delimiter,
/// which config validation rejects.
pub const FIELD_SEPARATOR: u8 = 0x1F;

/// A deterministic fixed-width digest over a byte slice.
///
/// Implementations must be pure: equal input, equal output, across threads
/// and across engines.
pub trait RecordHasher: Send + Sync {
    /// Digest `data` into a key.
    fn digest(&self, data: &[u8]) -> Key;

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;
}

/// BLAKE3 backend, truncated to [`KEY_WIDTH`] bytes. The preferred fast hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl RecordHasher for Blake3Hasher {
    fn digest(&self, data: &[u8]) -> Key {
        let mut key = [0u8; KEY_WIDTH];
        key.copy_from_slice(&blake3::hash(data).as_bytes()[..KEY_WIDTH]);
        key
    }

    fn name(&self) -> &'static str {
        "blake3"
    }
}

/// SHA-256 backend, truncated to [`KEY_WIDTH`] bytes. Cryptographic fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl RecordHasher for Sha256Hasher {
    fn digest(&self, data: &[u8]) -> Key {
        use sha2::{Digest, Sha256};
        let mut key = [0u8; KEY_WIDTH];
        key.copy_from_slice(&Sha256::digest(data)[..KEY_WIDTH]);
        key
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// Selectable hash backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashBackend {
    /// Fast 128-bit BLAKE3 key (default).
    #[default]
    Blake3,
    /// SHA-256 truncated to 128 bits.
    Sha256,
}

impl std::str::FromStr for HashBackend {
    type Err = crate::error::DupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            other => Err(crate::error::DupeError::Config(format!(
                "unknown hash backend '{other}' (expected blake3 or sha256)"
            ))),
        }
    }
}

/// Build the hasher for the selected backend.
#[must_use]
pub fn select_hasher(backend: HashBackend) -> Arc<dyn RecordHasher> {
    match backend {
        HashBackend::Blake3 => Arc::new(Blake3Hasher),
        HashBackend::Sha256 => Arc::new(Sha256Hasher),
    }
}

/// Format a key as lowercase hex for logs and reports.
#[must_use]
pub fn key_to_hex(key: &Key) -> String {
    let mut out = String::with_capacity(KEY_WIDTH * 2);
    for byte in key {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Derives a key and a bounded display prefix from a raw record line.
///
/// A line is split on the configured delimiter; the first `hash_fields`
/// fields (missing fields are empty strings, never an error) are joined
/// with [`FIELD_SEPARATOR`] and digested. Extraction has no side effects
/// and no failure mode: undecodable bytes are replaced before the line
/// reaches the extractor.
pub struct KeyExtractor {
    hash_fields: usize,
    delimiter: char,
    write_length: usize,
    hasher: Arc<dyn RecordHasher>,
}

impl KeyExtractor {
    /// Create an extractor from the engine configuration and the hasher
    /// selected for this run.
    #[must_use]
    pub fn new(config: &EngineConfig, hasher: Arc<dyn RecordHasher>) -> Self {
        Self {
            hash_fields: config.hash_fields,
            delimiter: config.hash_delimiter,
            write_length: config.write_length,
            hasher,
        }
    }

    /// Backend name, for the startup log line.
    #[must_use]
    pub fn hasher_name(&self) -> &'static str {
        self.hasher.name()
    }

    /// Compute the key for a trimmed record line.
    #[must_use]
    pub fn key_of(&self, line: &str) -> Key {
        self.hasher.digest(&self.normalized(line))
    }

    /// Truncate a record line to `write_length` characters for display.
    ///
    /// Character-based truncation; a line shorter than the limit is
    /// returned whole.
    #[must_use]
    pub fn display_prefix(&self, line: &str) -> String {
        match line.char_indices().nth(self.write_length) {
            Some((idx, _)) => line[..idx].to_string(),
            None => line.to_string(),
        }
    }

    /// Compute both the key and the display prefix in one pass.
    #[must_use]
    pub fn extract(&self, line: &str) -> (Key, String) {
        (self.key_of(line), self.display_prefix(line))
    }

    /// Join the first `hash_fields` fields with the fixed separator.
    ///
    /// Fields beyond the record's field count are treated as empty, so a
    /// short record hashes identically to one padded with trailing empty
    /// fields.
    fn normalized(&self, line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + self.hash_fields);
        let mut fields = line.split(self.delimiter);
        for i in 0..self.hash_fields {
            if i > 0 {
                buf.push(FIELD_SEPARATOR);
            }
            if let Some(field) = fields.next() {
                buf.extend_from_slice(field.as_bytes());
            }
        }
        buf
    }
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExtractor")
            .field("hash_fields", &self.hash_fields)
            .field("delimiter", &self.delimiter)
            .field("write_length", &self.write_length)
            .field("hasher", &self.hasher.name())
            .finish()
    }
}
