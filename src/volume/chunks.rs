//! Key/value storage underneath a precomputed volume.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{GtbotError, Stage};

/// Byte storage addressed by relative keys such as `info` or
/// `8_8_40/0-64_0-64_0-8`.
pub trait ChunkStore: Send + Sync {
    /// Where the store lives, for error messages.
    fn location(&self) -> &str;

    /// Returns `None` for a key that does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GtbotError>;

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), GtbotError>;
}

/// A chunk store rooted at a local directory.
#[derive(Clone, Debug)]
pub struct FileChunkStore {
    root: PathBuf,
    location: String,
}

impl FileChunkStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let location = root.display().to_string();
        Self { root, location }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ChunkStore for FileChunkStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GtbotError> {
        let path = self.root.join(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GtbotError::unavailable(
                Stage::CutoutRead,
                path.display().to_string(),
                e,
            )),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), GtbotError> {
        let path = self.root.join(key);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)
        };
        write().map_err(|e| {
            GtbotError::unavailable(Stage::CutoutWrite, path.display().to_string(), e)
        })
    }
}

/// A chunk store reached over HTTP(S).
///
/// `get` treats 404 as a missing chunk. `put` issues a `PUT` with the raw
/// bytes, which is what bucket endpoints accept for authorized writers.
#[cfg(feature = "remote")]
pub struct HttpChunkStore {
    base_url: String,
    agent: ureq::Agent,
    token: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpChunkStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: std::time::Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: config.into(),
            token,
        }
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(feature = "remote")]
impl ChunkStore for HttpChunkStore {
    fn location(&self) -> &str {
        &self.base_url
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GtbotError> {
        let url = self.url(key);
        let mut request = self.agent.get(&url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(mut response) => response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_vec()
                .map(Some)
                .map_err(|e| GtbotError::unavailable(Stage::CutoutRead, url, e)),
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(GtbotError::unavailable(Stage::CutoutRead, url, e)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), GtbotError> {
        let url = self.url(key);
        let mut request = self
            .agent
            .put(&url)
            .header("Content-Type", "application/octet-stream");
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        request
            .send(bytes)
            .map(|_| ())
            .map_err(|e| GtbotError::unavailable(Stage::CutoutWrite, url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileChunkStore::new(temp.path());
        assert_eq!(store.get("4_4_40/0-1_0-1_0-1").unwrap(), None);

        store.put("4_4_40/0-1_0-1_0-1", &[1, 2, 3]).unwrap();
        assert_eq!(
            store.get("4_4_40/0-1_0-1_0-1").unwrap(),
            Some(vec![1, 2, 3])
        );
        assert!(temp.path().join("4_4_40").is_dir());
    }
}
