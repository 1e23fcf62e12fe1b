//! Where model assets live: existence checks, downloads and GLB uploads.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rejected asset: {0}")]
    Rejected(String),
}

/// Storage seam used by the HBJSON layer: HTTP against the save server in
/// the viewer, the local upload directory inside the server itself.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Whether an asset is already available at `path`.
    async fn exists(&self, path: &str) -> Result<bool, AssetError>;

    /// Downloads `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;

    /// Persists a GLB under `name` and returns the path it is served from.
    async fn save_glb(&self, name: &str, glb: Vec<u8>) -> Result<String, AssetError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    file_path: String,
}

/// [`AssetStore`] speaking to the save-glb HTTP service.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: reqwest::Client,
    base_url: String,
    save_endpoint: String,
}

impl HttpAssetStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, save_endpoint: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            save_endpoint: save_endpoint.into(),
        }
    }

    /// Absolute URLs pass through; relative paths are joined to the base URL.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn exists(&self, path: &str) -> Result<bool, AssetError> {
        let url = self.resolve(path);
        let resp = self.client.head(&url).send().await?;
        debug!(%url, status = resp.status().as_u16(), "asset existence check");
        Ok(resp.status().is_success())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.resolve(url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(AssetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn save_glb(&self, name: &str, glb: Vec<u8>) -> Result<String, AssetError> {
        let url = self.resolve(&self.save_endpoint);
        let resp = self
            .client
            .post(&url)
            .query(&[("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(glb)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AssetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        let saved: SaveResponse = resp.json().await?;
        Ok(saved.file_path)
    }
}
