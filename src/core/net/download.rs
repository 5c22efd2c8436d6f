// ─── Download ───
// One network action: fetch a URL (with fallback mirrors) into a file or
// an in-memory buffer, with optional checksum validation and ETag-based
// cache revalidation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use md5::Md5;
use reqwest::header::{ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::net::cache::MetaCache;
use crate::core::task::{Task, TaskHandle};

/// Expected digest of the downloaded bytes, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha1(String),
    Sha256(String),
    Md5(String),
}

impl Checksum {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Sha1(_) => "SHA-1",
            Checksum::Sha256(_) => "SHA-256",
            Checksum::Md5(_) => "MD5",
        }
    }

    fn expected(&self) -> &str {
        match self {
            Checksum::Sha1(hex) | Checksum::Sha256(hex) | Checksum::Md5(hex) => hex,
        }
    }

    fn compute(&self, data: &[u8]) -> String {
        match self {
            Checksum::Sha1(_) => hex::encode(Sha1::digest(data)),
            Checksum::Sha256(_) => hex::encode(Sha256::digest(data)),
            Checksum::Md5(_) => hex::encode(Md5::digest(data)),
        }
    }

    /// Verify `data`, returning the actual digest on mismatch.
    pub fn verify(&self, data: &[u8]) -> Result<(), String> {
        let actual = self.compute(data);
        if actual.eq_ignore_ascii_case(self.expected()) {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

/// Where the bytes end up. A download writes to exactly one of these.
enum Sink {
    File(PathBuf),
    Memory,
}

pub struct Download {
    name: String,
    handle: TaskHandle,
    client: Client,
    /// Primary URL first, then fallback mirrors, tried in order.
    urls: Vec<String>,
    sink: Sink,
    checksum: Option<Checksum>,
    cache: Option<Arc<MetaCache>>,
    bytes: Option<Vec<u8>>,
}

impl Download {
    pub fn file(client: Client, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        let dest = dest.into();
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".into());
        Self::new(client, url.into(), Sink::File(dest), name)
    }

    pub fn memory(client: Client, url: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(client, url.clone(), Sink::Memory, url)
    }

    fn new(client: Client, url: String, sink: Sink, name: String) -> Self {
        let handle = TaskHandle::new();
        handle.set_abortable(true);
        Self {
            name,
            handle,
            client,
            urls: vec![url],
            sink,
            checksum: None,
            cache: None,
            bytes: None,
        }
    }

    pub fn with_mirror(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Enable conditional revalidation through the given cache index.
    pub fn with_cache(mut self, cache: Arc<MetaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn primary_url(&self) -> &str {
        &self.urls[0]
    }

    /// The downloaded body, for memory-sink downloads.
    pub fn take_bytes(&mut self) -> Option<Vec<u8>> {
        self.bytes.take()
    }

    /// Run the mirror loop outside the task state machine. `NetJob` calls
    /// this directly so it can retry failed parts across rounds.
    pub(crate) async fn perform(&mut self) -> LauncherResult<()> {
        let urls = self.urls.clone();
        let mut last_error = None;
        for (index, url) in urls.iter().enumerate() {
            self.handle.check_aborted()?;
            if index > 0 {
                debug!("Trying fallback mirror {} for {}", index, self.name);
            }
            match self.attempt(url).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    warn!("Download of {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(LauncherError::AllMirrorsFailed {
            url: self.primary_url().to_string(),
        }))
    }

    async fn attempt(&mut self, url: &str) -> LauncherResult<()> {
        let mut request = self.client.get(url);

        // revalidate instead of re-downloading when we still have the file
        // and a validator for it
        if let (Some(cache), Sink::File(dest)) = (&self.cache, &self.sink) {
            if dest.is_file() {
                if let Some(entry) = cache.get(dest) {
                    request = request.header(IF_NONE_MATCH, entry.etag);
                }
            }
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Cached copy of {} is still fresh", self.name);
            return Ok(());
        }
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let etag = header_string(&response, ETAG);
        let last_modified = header_string(&response, LAST_MODIFIED);
        let total = response.content_length();

        let mut body = Vec::new();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = self.handle.cancelled() => return Err(LauncherError::Aborted),
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            received += chunk.len() as u64;
            body.extend_from_slice(&chunk);
            self.handle.set_progress(received, total.unwrap_or(received));
        }

        // validate before committing to the sink
        if let Some(checksum) = &self.checksum {
            if let Err(actual) = checksum.verify(&body) {
                return Err(LauncherError::ChecksumMismatch {
                    algorithm: checksum.algorithm(),
                    path: match &self.sink {
                        Sink::File(dest) => dest.clone(),
                        Sink::Memory => PathBuf::from(&self.name),
                    },
                    expected: checksum.expected().to_string(),
                    actual,
                });
            }
        }

        match &self.sink {
            Sink::File(dest) => {
                write_file(dest, &body).await?;
                if let (Some(cache), Some(etag)) = (&self.cache, etag) {
                    cache.update(dest, etag, last_modified);
                }
                debug!("Downloaded {} -> {:?}", url, dest);
            }
            Sink::Memory => {
                self.bytes = Some(body);
                debug!("Downloaded {} into memory", url);
            }
        }
        Ok(())
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn write_file(dest: &Path, body: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    // write inside a block so the handle is dropped right away
    {
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
        file.write_all(body).await.map_err(|e| LauncherError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        file.flush().await.map_err(|e| LauncherError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[async_trait]
impl Task for Download {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    async fn execute(&mut self) -> LauncherResult<()> {
        self.perform().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_verify_known_vectors() {
        let data = b"abc";
        assert!(Checksum::Sha1("a9993e364706816aba3e25717850c26c9cd0d89d".into())
            .verify(data)
            .is_ok());
        assert!(Checksum::Sha256(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into()
        )
        .verify(data)
        .is_ok());
        assert!(Checksum::Md5("900150983cd24fb0d6963f7d28e17f72".into())
            .verify(data)
            .is_ok());
    }

    #[test]
    fn checksum_mismatch_reports_the_actual_digest() {
        let err = Checksum::Sha1("0000000000000000000000000000000000000000".into())
            .verify(b"abc")
            .unwrap_err();
        assert_eq!(err, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn checksum_comparison_is_case_insensitive() {
        assert!(Checksum::Sha1("A9993E364706816ABA3E25717850C26C9CD0D89D".into())
            .verify(b"abc")
            .is_ok());
    }

    #[test]
    fn mirrors_accumulate_behind_the_primary() {
        let client = Client::new();
        let download = Download::memory(client, "https://a.example/file")
            .with_mirror("https://b.example/file");
        assert_eq!(download.primary_url(), "https://a.example/file");
        assert_eq!(download.urls.len(), 2);
    }
}
