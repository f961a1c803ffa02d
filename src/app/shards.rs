//! Shard set resolution
//!
//! Large artifacts are split into shards named
//! `<base>-<NNNNN>-of-<MMMMM>.<ext>`, with fixed-width, zero-padded, 1-based
//! indices. Any one shard URL is enough to reconstruct the whole set, in
//! ascending index order. A query string or fragment after the file name is
//! carried verbatim onto every generated URL.
//!
//! # Examples
//!
//! ```rust
//! use model_fetcher::app::shards::{resolve_shards, ShardSource};
//!
//! let urls = resolve_shards(&ShardSource::from("https://host/model-00002-of-00003.gguf?x=1"));
//! assert_eq!(urls, vec![
//!     "https://host/model-00001-of-00003.gguf?x=1",
//!     "https://host/model-00002-of-00003.gguf?x=1",
//!     "https://host/model-00003-of-00003.gguf?x=1",
//! ]);
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::constants::artifact::SHARD_INDEX_WIDTH;
use crate::errors::{ArtifactError, ArtifactResult};

/// Input to shard resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardSource {
    /// A single URL, expanded if it follows the shard naming convention
    Single(String),
    /// An explicit list, used as-is
    List(Vec<String>),
}

impl ShardSource {
    /// URL that identifies the artifact as a whole
    pub fn canonical_url(&self) -> ArtifactResult<String> {
        resolve_shards(self)
            .into_iter()
            .next()
            .ok_or(ArtifactError::EmptyShardList)
    }
}

impl From<&str> for ShardSource {
    fn from(url: &str) -> Self {
        ShardSource::Single(url.to_string())
    }
}

impl From<String> for ShardSource {
    fn from(url: String) -> Self {
        ShardSource::Single(url)
    }
}

impl From<Vec<String>> for ShardSource {
    fn from(urls: Vec<String>) -> Self {
        ShardSource::List(urls)
    }
}

/// One shard of a multi-part artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// Everything before `-NNNNN-of-MMMMM`
    pub base_url: String,
    /// 1-based shard index
    pub index: u32,
    /// Number of shards in the set
    pub total: u32,
    /// File extension without the dot
    pub extension: String,
    /// Query string and/or fragment, including the leading `?` or `#`
    pub trailer: String,
}

fn shard_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*)-(\d{5})-of-(\d{5})\.([A-Za-z0-9]+)$")
            .expect("shard pattern is a valid regex")
    })
}

/// Split a URL into the part that is matched against naming rules and the
/// query/fragment trailer
fn split_trailer(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    }
}

impl ShardDescriptor {
    /// Parse a shard URL, `None` if it does not follow the convention
    pub fn parse(url: &str) -> Option<Self> {
        let (path, trailer) = split_trailer(url);
        let caps = shard_pattern().captures(path)?;

        let index: u32 = caps[2].parse().ok()?;
        let total: u32 = caps[3].parse().ok()?;
        if index == 0 || total == 0 || index > total {
            return None;
        }

        Some(Self {
            base_url: caps[1].to_string(),
            index,
            total,
            extension: caps[4].to_string(),
            trailer: trailer.to_string(),
        })
    }

    /// URL of shard `index` in this set
    pub fn url_for(&self, index: u32) -> String {
        format!(
            "{base}-{index:0width$}-of-{total:0width$}.{ext}{trailer}",
            base = self.base_url,
            index = index,
            total = self.total,
            ext = self.extension,
            trailer = self.trailer,
            width = SHARD_INDEX_WIDTH,
        )
    }

    /// All shard URLs of this set in ascending order
    pub fn urls(&self) -> Vec<String> {
        (1..=self.total).map(|i| self.url_for(i)).collect()
    }
}

/// Expand `source` into the ordered list of shard URLs
///
/// Lists are returned unchanged. A single URL that follows the shard naming
/// convention yields every shard of its set; anything else yields itself.
pub fn resolve_shards(source: &ShardSource) -> Vec<String> {
    match source {
        ShardSource::List(urls) => urls.clone(),
        ShardSource::Single(url) => resolve_url(url),
    }
}

/// Shorthand for [`resolve_shards`] on a single URL
pub fn resolve_url(url: &str) -> Vec<String> {
    match ShardDescriptor::parse(url) {
        Some(descriptor) => descriptor.urls(),
        None => vec![url.to_string()],
    }
}

/// Case-sensitive check that the file name in `url` ends with `extension`
///
/// Query string and fragment are ignored.
pub fn has_extension(url: &str, extension: &str) -> bool {
    let (path, _) = split_trailer(url);
    path.ends_with(extension)
}

/// Reject URLs that do not name an accepted artifact file
pub fn validate_extension(url: &str, extension: &str) -> ArtifactResult<()> {
    if has_extension(url, extension) {
        Ok(())
    } else {
        Err(ArtifactError::InvalidName {
            url: url.to_string(),
            extension: extension.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_resolves_to_itself() {
        for url in [
            "https://example.com/model.gguf",
            "https://example.com/model.gguf?download=true",
            "model-q4_k_m.gguf",
        ] {
            assert_eq!(resolve_url(url), vec![url.to_string()]);
        }
    }

    #[test]
    fn test_three_shard_expansion() {
        assert_eq!(
            resolve_url("model-00001-of-00003.gguf"),
            vec![
                "model-00001-of-00003.gguf",
                "model-00002-of-00003.gguf",
                "model-00003-of-00003.gguf",
            ]
        );
    }

    #[test]
    fn test_any_shard_yields_same_set() {
        let expected = resolve_url("https://h/m-00001-of-00004.gguf");
        assert_eq!(expected.len(), 4);
        for url in &expected {
            assert_eq!(&resolve_url(url), &expected);
        }
    }

    #[test]
    fn test_trailer_preserved_on_every_url() {
        let urls = resolve_url("https://h/m-00002-of-00002.gguf?token=a-00001-of-00009#frag");
        assert_eq!(
            urls,
            vec![
                "https://h/m-00001-of-00002.gguf?token=a-00001-of-00009#frag",
                "https://h/m-00002-of-00002.gguf?token=a-00001-of-00009#frag",
            ]
        );
    }

    #[test]
    fn test_single_shard_set() {
        assert_eq!(
            resolve_url("m-00001-of-00001.gguf"),
            vec!["m-00001-of-00001.gguf"]
        );
    }

    #[test]
    fn test_malformed_patterns_fall_through() {
        for url in [
            "m-0001-of-00003.gguf",
            "m-00001-of-003.gguf",
            "m-000001-of-00003.gguf",
            "m-0000a-of-00003.gguf",
            "m-00000-of-00003.gguf",
            "m-00004-of-00003.gguf",
            "m-00001-of-00000.gguf",
            "m-00001-of-00003",
        ] {
            assert_eq!(resolve_url(url), vec![url.to_string()], "{}", url);
        }
    }

    #[test]
    fn test_list_is_returned_unchanged() {
        let list = vec!["b.gguf".to_string(), "a.gguf".to_string()];
        assert_eq!(resolve_shards(&ShardSource::List(list.clone())), list);
        assert_eq!(
            ShardSource::List(list).canonical_url().unwrap(),
            "b.gguf"
        );
        assert!(matches!(
            ShardSource::List(Vec::new()).canonical_url(),
            Err(ArtifactError::EmptyShardList)
        ));
    }

    #[test]
    fn test_descriptor_fields() {
        let d = ShardDescriptor::parse("https://h/m-00002-of-00005.gguf?x=1").unwrap();
        assert_eq!(d.base_url, "https://h/m");
        assert_eq!(d.index, 2);
        assert_eq!(d.total, 5);
        assert_eq!(d.extension, "gguf");
        assert_eq!(d.trailer, "?x=1");
    }

    #[test]
    fn test_extension_validation() {
        assert!(validate_extension("https://h/m.gguf", ".gguf").is_ok());
        assert!(validate_extension("https://h/m.gguf?download=1#top", ".gguf").is_ok());
        assert!(validate_extension("https://h/m-00001-of-00002.gguf", ".gguf").is_ok());

        for url in ["https://h/m.bin", "https://h/m.gguf.bin", "https://h/m.GGUF"] {
            assert!(matches!(
                validate_extension(url, ".gguf"),
                Err(ArtifactError::InvalidName { .. })
            ));
        }
    }
}
