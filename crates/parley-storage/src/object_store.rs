use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::StorageError;

/// Durable object storage, consumed through a narrow seam: a byte stream
/// goes in under a key, a retrievable location comes out.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError>;
}

/// HTTP-backed store: streams the spooled file as a PUT to
/// `{base_url}/{key}`; the final URL is the durable location.
pub struct HttpObjectStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let file = fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let url = format!("{}/{}", self.base_url, key);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::Upload(format!(
                "{} responded {}",
                url,
                response.status()
            )));
        }

        info!("Uploaded {} bytes to {}", len, url);
        Ok(url)
    }
}

/// In-memory store for tests and single-node dev runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let data = fs::read(path).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data);
        Ok(format!("memory://{key}"))
    }
}
