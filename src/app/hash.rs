//! Content-addressed cache keys
//!
//! A [`CacheKey`] is a deterministic function of an artifact URL: the MD5
//! digest of the full URL string, followed by a human-readable suffix taken
//! from the URL's last path segment. The digest keeps distinct URLs apart
//! (including URLs that differ only in their query string), while the suffix
//! keeps the cache directory readable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::cache::MAX_KEY_SUFFIX_LEN;

/// MD5 digest stored as raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Digest arbitrary bytes
    pub fn compute(data: impl AsRef<[u8]>) -> Self {
        Md5Hash(md5::compute(data).0)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Md5Hash(bytes)
    }

    /// Get the raw byte array representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase 32-character hexadecimal representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(32), |mut acc, b| {
            let _ = write!(&mut acc, "{:02x}", b);
            acc
        })
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Storage key for one cached artifact file
///
/// The same URL always maps to the same key. Keys are also the on-disk file
/// names, so they only ever contain `[0-9A-Za-z._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a URL
    pub fn from_url(url: &str) -> Self {
        let digest = Md5Hash::compute(url.as_bytes());
        let suffix = Self::suffix_for(url);
        if suffix.is_empty() {
            CacheKey(digest.to_hex())
        } else {
            CacheKey(format!("{}_{}", digest, suffix))
        }
    }

    /// Wrap a key read back from storage
    ///
    /// Used when enumerating the cache directory, where the file name is
    /// already a key.
    pub fn from_stored(name: impl Into<String>) -> Self {
        CacheKey(name.into())
    }

    /// The key as a file name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable suffix: last path segment, query and fragment stripped
    fn suffix_for(url: &str) -> String {
        let without_query = url.split(['?', '#']).next().unwrap_or("");
        let segment = without_query.rsplit('/').next().unwrap_or("");
        segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_KEY_SUFFIX_LEN)
            .collect::<String>()
            .trim_start_matches('.')
            .to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        let hash = Md5Hash::compute(b"");
        assert_eq!(hash.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash.as_bytes().len(), 16);
        assert_eq!(Md5Hash::from_bytes(*hash.as_bytes()), hash);
    }

    #[test]
    fn test_key_is_deterministic() {
        let url = "https://huggingface.co/org/repo/resolve/main/model-q4.gguf";
        assert_eq!(CacheKey::from_url(url), CacheKey::from_url(url));
    }

    #[test]
    fn test_key_suffix_is_last_segment() {
        let key = CacheKey::from_url("https://example.com/models/tiny-00001-of-00002.gguf?download=1");
        assert!(key.as_str().ends_with("_tiny-00001-of-00002.gguf"));
        assert_eq!(key.as_str().len(), 32 + 1 + "tiny-00001-of-00002.gguf".len());
    }

    #[test]
    fn test_query_changes_key() {
        let a = CacheKey::from_url("https://example.com/model.gguf?rev=1");
        let b = CacheKey::from_url("https://example.com/model.gguf?rev=2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_unsafe_characters_are_replaced() {
        let key = CacheKey::from_url("https://example.com/dir/we%20ird name.gguf");
        let suffix = key.as_str().split_once('_').map(|(_, s)| s).unwrap();
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')));
    }

    #[test]
    fn test_no_suffix_for_trailing_slash() {
        let key = CacheKey::from_url("https://example.com/");
        assert_eq!(key.as_str().len(), 32);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let key = CacheKey::from_stored("abc_model.gguf");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc_model.gguf\"");
    }
}
