//! # Persistent Cache Store
//!
//! One JSON file per key under the configured directory.
//!
//! ## File names
//! Keys are percent-encoded into file-system safe names:
//! - `%` itself, the characters `/ \ < > : " | ? * #` and control characters are
//!   written as `%XX`
//! - a trailing `.` or space is escaped as well
//! - reserved device names (`CON`, `PRN`, `AUX`, `NUL`, `COM1`-`COM9`, `LPT1`-`LPT9`)
//!   and empty keys are rejected
//! - names longer than [`MAX_NAME_LEN`] bytes are replaced by the SHA-256 of the key
//!
//! The encoding is injective and never produces a path separator, so entries can
//! neither collide nor land outside the cache directory.
//!
//! ## Concurrency
//! Writes go to a temporary file that is renamed into place. A file that disappears or
//! fails to parse while being read is reported as a miss.

use super::{CacheEntry, CacheStrategy};
use crate::caching::{CacheError, CacheKind, CacheOptions, CacheResult};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest encoded name stored as-is
pub const MAX_NAME_LEN: usize = 200;

const ENTRY_EXTENSION: &str = "json";
const HASHED_SUFFIX: &str = "#h";

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Filesystem-backed cache implementation
#[derive(Debug, Default)]
pub struct PersistentCache;

impl PersistentCache {
    pub fn new() -> Self {
        Self
    }

    /// Location of the file holding `key`
    pub fn entry_path(key: &str, options: &CacheOptions) -> CacheResult<PathBuf> {
        let name = encode_file_name(key)?;
        Ok(options
            .path
            .join(format!("{}.{}", name, ENTRY_EXTENSION)))
    }

    async fn write_atomically(directory: &Path, target: &Path, contents: Vec<u8>) -> CacheResult<()> {
        fs::create_dir_all(directory).await?;

        let temporary = directory.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&temporary, contents).await?;

        if let Err(error) = fs::rename(&temporary, target).await {
            let _ = fs::remove_file(&temporary).await;
            return Err(error.into());
        }
        Ok(())
    }
}

/// Encode a cache key into a safe file name (without extension)
pub fn encode_file_name(key: &str) -> CacheResult<String> {
    if key.is_empty() {
        return Err(CacheError::invalid_key(key, "empty key"));
    }

    let stem = key.split('.').next().unwrap_or(key);
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem.trim_end()))
    {
        return Err(CacheError::invalid_key(key, "reserved device name"));
    }

    let mut encoded = String::with_capacity(key.len());
    let last = key.chars().count() - 1;
    for (index, c) in key.chars().enumerate() {
        let trailing = index == last && (c == '.' || c == ' ');
        if needs_escape(c) || trailing {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        } else {
            encoded.push(c);
        }
    }

    if encoded.len() > MAX_NAME_LEN {
        let digest = Sha256::digest(key.as_bytes());
        return Ok(format!("{}{}", hex::encode(digest), HASHED_SUFFIX));
    }

    Ok(encoded)
}

fn needs_escape(c: char) -> bool {
    matches!(c, '%' | '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#') || c.is_control()
}

#[async_trait]
impl CacheStrategy for PersistentCache {
    async fn get(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<Value>> {
        let path = Self::entry_path(key, options)?;

        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let entry: CacheEntry = match serde_json::from_slice(&contents) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key = %key, error = %error, "Discarding unreadable cache entry");
                self.invalidate(key, options).await?;
                return Ok(None);
            }
        };

        if entry.is_expired() {
            debug!(key = %key, "Evicted expired cache entry");
            self.invalidate(key, options).await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<()> {
        let path = Self::entry_path(key, options)?;
        let contents = serde_json::to_vec(&CacheEntry::new(value, options.ttl))?;
        Self::write_atomically(&options.path, &path, contents).await
    }

    async fn invalidate(&self, key: &str, options: &CacheOptions) -> CacheResult<()> {
        let path = Self::entry_path(key, options)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn invalidate_all(&self, options: &CacheOptions) -> CacheResult<()> {
        match fs::remove_dir_all(&options.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Persistent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> CacheOptions {
        CacheOptions::default().with_path(dir.path().join("cache"))
    }

    #[test]
    fn test_unsafe_characters_are_encoded() {
        let name = encode_file_name("GET::https://api.example.com/todos/5?x=1").unwrap();
        assert_eq!(
            name,
            "GET%3A%3Ahttps%3A%2F%2Fapi.example.com%2Ftodos%2F5%3Fx=1"
        );
        assert!(!name.contains('/'));

        assert_eq!(encode_file_name("a\\b<c>d\"e|f*g#h%").unwrap(), "a%5Cb%3Cc%3Ed%22e%7Cf%2Ag%23h%25");
        assert_eq!(encode_file_name("..").unwrap(), ".%2E");
        assert_eq!(encode_file_name("name ").unwrap(), "name%20");
    }

    #[test]
    fn test_encoding_is_collision_free() {
        // A literal escape sequence must not collide with the character it encodes
        let escaped = encode_file_name("a%2Fb").unwrap();
        let slash = encode_file_name("a/b").unwrap();
        assert_ne!(escaped, slash);
    }

    #[test]
    fn test_reserved_and_empty_keys_are_rejected() {
        for key in ["CON", "con", "Nul.json", "com1", "LPT9.x", ""] {
            let error = encode_file_name(key).unwrap_err();
            assert!(matches!(error, CacheError::InvalidKey { .. }), "{}", key);
        }
        assert!(encode_file_name("CONSOLE").is_ok());
        assert!(encode_file_name("COM10").is_ok());
    }

    #[test]
    fn test_long_keys_are_hashed() {
        let key = format!("GET::https://x/{}", "a".repeat(300));
        let name = encode_file_name(&key).unwrap();
        assert!(name.ends_with(HASHED_SUFFIX));
        assert_eq!(name.len(), 64 + HASHED_SUFFIX.len());
        assert_eq!(name, encode_file_name(&key).unwrap());
    }

    #[tokio::test]
    async fn test_round_trip_stays_inside_directory() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        let cache = PersistentCache::new();
        let key = "GET::https://x/../../escape";

        cache.set(key, json!({"id": "5"}), &options).await.unwrap();
        assert_eq!(cache.get(key, &options).await.unwrap(), Some(json!({"id": "5"})));

        let path = PersistentCache::entry_path(key, &options).unwrap();
        assert_eq!(path.parent(), Some(options.path.as_path()));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir).with_ttl(Duration::from_millis(20));
        let cache = PersistentCache::new();

        cache.set("k", json!(1), &options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("k", &options).await.unwrap(), None);
        assert!(!PersistentCache::entry_path("k", &options).unwrap().exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_invalidated() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        let cache = PersistentCache::new();
        let path = PersistentCache::entry_path("k", &options).unwrap();

        std::fs::create_dir_all(&options.path).unwrap();
        std::fs::write(&path, b"{\"value\": 1, \"expi").unwrap();

        assert_eq!(cache.get("k", &options).await.unwrap(), None);
        assert!(!path.exists());

        // Well-formed JSON of the wrong shape is discarded the same way
        std::fs::write(&path, b"[1, 2, 3]").unwrap();
        assert_eq!(cache.get("k", &options).await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalidate_all_removes_directory() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        let cache = PersistentCache::new();

        cache.set("a", json!("a"), &options).await.unwrap();
        cache.set("b", json!("b"), &options).await.unwrap();
        cache.invalidate_all(&options).await.unwrap();

        assert!(!options.path.exists());
        assert_eq!(cache.get("a", &options).await.unwrap(), None);

        // Invalidating a missing directory or key is not an error
        cache.invalidate_all(&options).await.unwrap();
        cache.invalidate("a", &options).await.unwrap();
    }
}
