//! Compiled-contract artifact bundles.
//!
//! A [`Locator`] names a bundle; an [`ArtifactSource`] turns it into a directory on disk.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_core::primitives::B256;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tempdir::TempDir;
use url::Url;

use crate::standard::{self, StandardConfig};

mod download;
pub use download::{HttpArtifactSource, unpack_verified};

const TAG_SCHEME: &str = "tag";
const FILE_SCHEME: &str = "file";
const CHECKSUM_FRAGMENT: &str = "sha256=";

/// Reference to an artifact bundle.
///
/// Textual forms:
/// - `tag://<release>`: a release tag resolved through the standard tag table
/// - `https://...#sha256=<hex>`: a remote tarball and the SHA-256 it must match
/// - `file://<dir>`: an already unpacked local directory, used as is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Tag(String),
    Url { url: Url, checksum: B256 },
    File(PathBuf),
}

/// A locator with its tag looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocator {
    Remote { url: Url, checksum: B256 },
    Local(PathBuf),
}

impl Locator {
    pub fn default_l1() -> Self {
        Self::Tag(standard::DEFAULT_L1_CONTRACTS_TAG.to_string())
    }

    pub fn default_l2() -> Self {
        Self::Tag(standard::DEFAULT_L2_CONTRACTS_TAG.to_string())
    }

    /// The release tag, for tag locators.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    /// Resolve tags to a download URL and the checksum the bundle must match.
    pub fn resolve(&self, standard: &StandardConfig) -> Result<ResolvedLocator> {
        match self {
            Self::Tag(tag) => {
                let release = standard.tag(tag)?;
                Ok(ResolvedLocator::Remote {
                    url: release.artifacts_url()?,
                    checksum: release.artifacts_hash,
                })
            }
            Self::Url { url, checksum } => Ok(ResolvedLocator::Remote {
                url: url.clone(),
                checksum: *checksum,
            }),
            Self::File(path) => Ok(ResolvedLocator::Local(path.clone())),
        }
    }
}

fn checksum_from_url(url: &Url) -> Result<B256> {
    let fragment = url.fragment().with_context(|| {
        format!("{} needs a #{}<hex> fragment naming the bundle's checksum", url, CHECKSUM_FRAGMENT)
    })?;
    let hex = fragment
        .strip_prefix(CHECKSUM_FRAGMENT)
        .with_context(|| format!("unrecognized locator fragment: {}", fragment))?;
    B256::from_str(hex).context("invalid sha256 in locator fragment")
}

impl FromStr for Locator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).with_context(|| format!("invalid artifacts locator: {}", s))?;
        match url.scheme() {
            TAG_SCHEME => {
                let tag = s
                    .strip_prefix("tag://")
                    .filter(|tag| !tag.is_empty())
                    .context("tag locator must name a release")?;
                Ok(Self::Tag(tag.to_string()))
            }
            FILE_SCHEME => {
                let path = url
                    .to_file_path()
                    .map_err(|()| anyhow::anyhow!("invalid file locator: {}", s))?;
                Ok(Self::File(path))
            }
            "http" | "https" => {
                let checksum = checksum_from_url(&url)?;
                Ok(Self::Url { url, checksum })
            }
            other => anyhow::bail!("unsupported locator scheme: {}", other),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "tag://{}", tag),
            Self::Url { url, .. } => write!(f, "{}", url),
            Self::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Receives download progress ticks. `total` is `None` when the size is unknown.
pub trait ProgressSink: Send + Sync {
    fn tick(&self, current: u64, total: Option<u64>);
}

/// Logs progress roughly every tenth of the download.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: std::sync::atomic::AtomicU64,
}

impl ProgressSink for LogProgress {
    fn tick(&self, current: u64, total: Option<u64>) {
        use std::sync::atomic::Ordering;

        let Some(total) = total.filter(|total| *total > 0) else {
            tracing::trace!(current, "Downloading artifacts");
            return;
        };
        let decile = current.saturating_mul(10) / total;
        if self.last_decile.swap(decile, Ordering::Relaxed) != decile {
            tracing::info!(current, total, "Downloading artifacts ({}%)", decile * 10);
        }
    }
}

/// Ignores progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&self, _current: u64, _total: Option<u64>) {}
}

/// An artifact bundle on disk. Owns the unpacked directory when it was downloaded.
#[derive(Debug)]
pub struct ArtifactBundle {
    root: PathBuf,
    scratch: Option<TempDir>,
}

impl ArtifactBundle {
    /// A bundle backed by a directory the caller manages.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: None,
        }
    }

    fn unpacked(scratch: TempDir) -> Self {
        Self {
            root: scratch.path().to_path_buf(),
            scratch: Some(scratch),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove any directory created while fetching.
    pub fn cleanup(self) -> Result<()> {
        if let Some(scratch) = self.scratch {
            scratch
                .close()
                .with_context(|| format!("Failed to remove {}", self.root.display()))?;
        }
        Ok(())
    }
}

/// Retrieves artifact bundles.
pub trait ArtifactSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        locator: &'a Locator,
        progress: &'a dyn ProgressSink,
    ) -> impl Future<Output = Result<ArtifactBundle>> + Send + 'a;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_locator() {
        let locator: Locator = "tag://op-contracts/v1.6.0".parse().unwrap();
        assert_eq!(locator, Locator::Tag("op-contracts/v1.6.0".to_string()));
        assert_eq!(locator.to_string(), "tag://op-contracts/v1.6.0");
    }

    #[test]
    fn test_standard_url_needs_explicit_checksum() {
        let standard = StandardConfig::load().unwrap();
        let ResolvedLocator::Remote { url, checksum } =
            Locator::default_l1().resolve(&standard).unwrap()
        else {
            panic!("tag should resolve to a remote bundle");
        };

        // the hex in the file name is not the tarball's digest
        assert!(url.as_str().parse::<Locator>().is_err());

        let locator: Locator = format!("{}#sha256={}", url, hex::encode(checksum))
            .parse()
            .unwrap();
        assert!(matches!(&locator, Locator::Url { checksum: parsed, .. } if *parsed == checksum));
        assert_eq!(locator.to_string().parse::<Locator>().unwrap(), locator);
    }

    #[test]
    fn test_parse_url_locator_with_fragment() {
        let hex = "11".repeat(32);
        let locator: Locator = format!("https://example.com/bundle.tgz#sha256={}", hex)
            .parse()
            .unwrap();
        assert!(matches!(locator, Locator::Url { checksum, .. } if checksum == B256::repeat_byte(0x11)));
    }

    #[test]
    fn test_url_without_checksum_rejected() {
        assert!("https://example.com/bundle.tgz".parse::<Locator>().is_err());
    }

    #[test]
    fn test_parse_file_locator() {
        let locator: Locator = "file:///var/artifacts".parse().unwrap();
        assert_eq!(locator, Locator::File(PathBuf::from("/var/artifacts")));
        assert_eq!(locator.to_string(), "file:///var/artifacts");
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!("ftp://example.com/x".parse::<Locator>().is_err());
    }

    #[test]
    fn test_resolve_tag() {
        let standard = StandardConfig::load().unwrap();
        let resolved = Locator::default_l1().resolve(&standard).unwrap();
        let ResolvedLocator::Remote { url, .. } = resolved else {
            panic!("tag should resolve to a remote bundle");
        };
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_local_bundle_cleanup_keeps_directory() {
        let dir = TempDir::new("opchain-local-bundle").unwrap();
        let bundle = ArtifactBundle::local(dir.path());
        bundle.cleanup().unwrap();
        assert!(dir.path().exists());
    }
}
