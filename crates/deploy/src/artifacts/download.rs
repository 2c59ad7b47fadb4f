//! HTTP artifact retrieval with an on-disk cache keyed by checksum.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use alloy_core::primitives::B256;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempdir::TempDir;
use url::Url;

use super::{ArtifactBundle, ArtifactSource, Locator, ProgressSink, ResolvedLocator};
use crate::standard::StandardConfig;

/// Downloads bundles over HTTP, verifies their SHA-256 and unpacks them into a scratch directory.
#[derive(Debug, Clone)]
pub struct HttpArtifactSource<'a> {
    standard: &'a StandardConfig,
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl<'a> HttpArtifactSource<'a> {
    pub fn new(standard: &'a StandardConfig, cache_dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .context("No cache directory on this platform; pass one explicitly")?
                .join("opchain")
                .join("artifacts"),
        };

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            standard,
            client,
            cache_dir,
        })
    }

    async fn download(
        &self,
        url: &Url,
        checksum: B256,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create cache directory {}", self.cache_dir.display())
        })?;
        let target = self
            .cache_dir
            .join(format!("{}.tar.gz", hex::encode(checksum)));

        if target.exists() {
            if sha256_file(&target)? == checksum {
                tracing::debug!(path = %target.display(), "Using cached artifacts");
                return Ok(target);
            }
            tracing::warn!(path = %target.display(), "Cached artifacts are corrupt, downloading again");
        }

        tracing::info!(%url, "Downloading artifacts");

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?
            .error_for_status()
            .with_context(|| format!("Artifact download failed for {}", url))?;

        let total = response.content_length();
        let partial = target.with_extension("partial");
        let mut file = File::create(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        let mut hasher = Sha256::new();
        let mut current = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .with_context(|| format!("Failed to write {}", partial.display()))?;
            current += chunk.len() as u64;
            progress.tick(current, total);
        }
        file.sync_all()
            .with_context(|| format!("Failed to flush {}", partial.display()))?;

        let actual = B256::from_slice(&hasher.finalize());
        if actual != checksum {
            let _ = std::fs::remove_file(&partial);
            anyhow::bail!(
                "artifact checksum mismatch for {}: expected {}, got {}",
                url,
                checksum,
                actual
            );
        }

        std::fs::rename(&partial, &target)
            .with_context(|| format!("Failed to move artifacts into {}", target.display()))?;
        Ok(target)
    }
}

impl ArtifactSource for HttpArtifactSource<'_> {
    async fn fetch<'a>(
        &'a self,
        locator: &'a Locator,
        progress: &'a dyn ProgressSink,
    ) -> Result<ArtifactBundle> {
        match locator.resolve(self.standard)? {
            ResolvedLocator::Local(path) => {
                if !path.is_dir() {
                    anyhow::bail!("artifacts directory {} does not exist", path.display());
                }
                Ok(ArtifactBundle::local(path))
            }
            ResolvedLocator::Remote { url, checksum } => {
                let archive = self.download(&url, checksum, progress).await?;
                tokio::task::spawn_blocking(move || unpack_verified(&archive, checksum))
                    .await
                    .context("Artifact unpacking task panicked")?
            }
        }
    }
}

fn sha256_file(path: &Path) -> Result<B256> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
    );
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(B256::from_slice(&hasher.finalize()))
}

/// Check a gzipped tarball against `checksum` and unpack it into a fresh scratch directory.
pub fn unpack_verified(archive: &Path, checksum: B256) -> Result<ArtifactBundle> {
    let actual = sha256_file(archive)?;
    if actual != checksum {
        anyhow::bail!(
            "artifact checksum mismatch for {}: expected {}, got {}",
            archive.display(),
            checksum,
            actual
        );
    }

    let scratch = TempDir::new("opchain-artifacts").context("Failed to create scratch directory")?;
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    tar::Archive::new(flate2::read::GzDecoder::new(BufReader::new(file)))
        .unpack(scratch.path())
        .with_context(|| format!("Failed to unpack {}", archive.display()))?;

    tracing::debug!(path = %scratch.path().display(), "Artifacts unpacked");
    Ok(ArtifactBundle::unpacked(scratch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::NoProgress;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Keeps every progress tick.
    #[derive(Debug, Default)]
    struct RecordingProgress {
        ticks: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl RecordingProgress {
        fn ticks(&self) -> Vec<(u64, Option<u64>)> {
            self.ticks.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingProgress {
        fn tick(&self, current: u64, total: Option<u64>) {
            self.ticks.lock().unwrap().push((current, total));
        }
    }

    /// Serve `body` over HTTP on a local port. Returns the bundle URL and a request counter.
    async fn serve(body: Vec<u8>) -> (Url, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(read) => request.extend_from_slice(&buf[..read]),
                        }
                    }
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let url = format!("http://{}/artifacts.tar.gz", addr).parse().unwrap();
        (url, requests)
    }

    fn write_bundle(dir: &Path) -> PathBuf {
        let archive = dir.join("bundle.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);

        let body = br#"{"abi":[]}"#;
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "forge-artifacts/Proxy.sol/Proxy.json", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        archive
    }

    #[test]
    fn test_unpack_verified_extracts_files() {
        let dir = TempDir::new("opchain-download-test").unwrap();
        let archive = write_bundle(dir.path());
        let checksum = sha256_file(&archive).unwrap();

        let bundle = unpack_verified(&archive, checksum).unwrap();
        let extracted = bundle.path().join("forge-artifacts/Proxy.sol/Proxy.json");
        assert!(extracted.exists(), "artifact should be unpacked");

        let root = bundle.path().to_path_buf();
        bundle.cleanup().unwrap();
        assert!(!root.exists(), "cleanup should remove the scratch directory");
    }

    #[test]
    fn test_unpack_verified_rejects_mismatch() {
        let dir = TempDir::new("opchain-download-test").unwrap();
        let archive = write_bundle(dir.path());

        let err = unpack_verified(&archive, B256::repeat_byte(0xab)).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_fetch_file_locator() {
        let standard = StandardConfig::load().unwrap();
        let dir = TempDir::new("opchain-download-test").unwrap();
        let source =
            HttpArtifactSource::new(&standard, Some(dir.path().join("cache"))).unwrap();

        let locator = Locator::File(dir.path().to_path_buf());
        let bundle = source.fetch(&locator, &NoProgress).await.unwrap();
        assert_eq!(bundle.path(), dir.path());
    }

    #[tokio::test]
    async fn test_fetch_missing_directory_fails() {
        let standard = StandardConfig::load().unwrap();
        let dir = TempDir::new("opchain-download-test").unwrap();
        let source =
            HttpArtifactSource::new(&standard, Some(dir.path().join("cache"))).unwrap();

        let locator = Locator::File(dir.path().join("missing"));
        assert!(source.fetch(&locator, &NoProgress).await.is_err());
    }

    #[tokio::test]
    async fn test_download_reports_progress_and_caches() {
        let dir = TempDir::new("opchain-download-test").unwrap();
        let body = std::fs::read(write_bundle(dir.path())).unwrap();
        let checksum = B256::from_slice(&Sha256::digest(&body));
        let (url, requests) = serve(body.clone()).await;

        let standard = StandardConfig::load().unwrap();
        let cache = dir.path().join("cache");
        let source = HttpArtifactSource::new(&standard, Some(cache.clone())).unwrap();
        let locator = Locator::Url { url, checksum };

        let progress = RecordingProgress::default();
        let bundle = source.fetch(&locator, &progress).await.unwrap();
        assert!(
            bundle
                .path()
                .join("forge-artifacts/Proxy.sol/Proxy.json")
                .exists()
        );
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        let ticks = progress.ticks();
        let total = body.len() as u64;
        assert_eq!(ticks.last(), Some(&(total, Some(total))));
        assert!(ticks.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(cache.join(format!("{}.tar.gz", hex::encode(checksum))).exists());

        // the second fetch unpacks the cached tarball without a request
        let again = RecordingProgress::default();
        let cached = source.fetch(&locator, &again).await.unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(again.ticks().is_empty());
        assert_ne!(cached.path(), bundle.path());

        bundle.cleanup().unwrap();
        cached.cleanup().unwrap();
    }

    #[tokio::test]
    async fn test_download_mismatch_leaves_nothing_behind() {
        let dir = TempDir::new("opchain-download-test").unwrap();
        let body = std::fs::read(write_bundle(dir.path())).unwrap();
        let (url, requests) = serve(body).await;

        let standard = StandardConfig::load().unwrap();
        let cache = dir.path().join("cache");
        let source = HttpArtifactSource::new(&standard, Some(cache.clone())).unwrap();
        let locator = Locator::Url {
            url,
            checksum: B256::repeat_byte(0xab),
        };

        let err = source.fetch(&locator, &NoProgress).await.unwrap_err();
        assert!(format!("{:#}", err).contains("checksum mismatch"));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        let leftovers: Vec<_> = std::fs::read_dir(&cache).unwrap().collect();
        assert!(leftovers.is_empty(), "no partial or cached file may remain");
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_downloaded_again() {
        let dir = TempDir::new("opchain-download-test").unwrap();
        let body = std::fs::read(write_bundle(dir.path())).unwrap();
        let checksum = B256::from_slice(&Sha256::digest(&body));
        let (url, requests) = serve(body).await;

        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let cached = cache.join(format!("{}.tar.gz", hex::encode(checksum)));
        std::fs::write(&cached, b"truncated").unwrap();

        let standard = StandardConfig::load().unwrap();
        let source = HttpArtifactSource::new(&standard, Some(cache)).unwrap();
        let bundle = source
            .fetch(&Locator::Url { url, checksum }, &NoProgress)
            .await
            .unwrap();

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(sha256_file(&cached).unwrap(), checksum);
        bundle.cleanup().unwrap();
    }
}
