//! GLB upload directory: idempotent saves and the save-glb route.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use layers::assets::{AssetError, AssetStore};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::AppState;

pub const UPLOADS_DIR: &str = "uploads";
pub const DEFAULT_GLB_NAME: &str = "demo.glb";
const MAX_NAME_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("body is not a GLB file")]
    NotGlb,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    AlreadyExists,
}

/// Plain `name.glb` file names only: no separators, no leading dot.
pub fn validate_name(name: &str) -> Result<(), UploadError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name.ends_with(".glb")
        && name.len() > ".glb".len()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidName(name.to_string()))
    }
}

/// URL path a saved upload is served under.
pub fn served_path(name: &str) -> String {
    format!("/{UPLOADS_DIR}/{name}")
}

/// Upload directory with write-once semantics: the first complete upload of
/// a name wins, later ones are acknowledged without touching the file.
#[derive(Debug)]
pub struct GlbUploads {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl GlbUploads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, UploadError> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    pub async fn exists(&self, name: &str) -> Result<bool, UploadError> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    pub async fn save(&self, name: &str, glb: Bytes) -> Result<SaveOutcome, UploadError> {
        let path = self.path_for(name)?;
        if !formats::is_glb(&glb) {
            return Err(UploadError::NotGlb);
        }

        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(&path).await? {
            info!("GLB file already exists: {}", path.display());
            return Ok(SaveOutcome::AlreadyExists);
        }

        let dir = self.dir.clone();
        let outcome = tokio::task::spawn_blocking(move || write_new(&dir, &path, &glb)).await??;
        Ok(outcome)
    }
}

/// Writes through a temp file in the target directory and renames it into
/// place without replacing an existing file.
fn write_new(dir: &Path, path: &Path, glb: &[u8]) -> Result<SaveOutcome, UploadError> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(glb)?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(path) {
        Ok(_) => {
            info!("GLB file saved successfully: {}", path.display());
            Ok(SaveOutcome::Created)
        }
        Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
            warn!("GLB file appeared during save, keeping it: {}", path.display());
            Ok(SaveOutcome::AlreadyExists)
        }
        Err(err) => Err(err.error.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveQuery {
    pub name: Option<String>,
}

pub async fn save_glb(
    State(state): State<AppState>,
    Query(query): Query<SaveQuery>,
    body: Bytes,
) -> Response {
    let name = query.name.unwrap_or_else(|| DEFAULT_GLB_NAME.to_string());
    info!(bytes = body.len(), %name, "Received request to save GLB file");

    match state.uploads.save(&name, body).await {
        Ok(_) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                http::header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000"),
            );
            (
                StatusCode::OK,
                headers,
                Json(json!({ "filePath": served_path(&name) })),
            )
                .into_response()
        }
        Err(err @ (UploadError::InvalidName(_) | UploadError::NotGlb)) => {
            warn!("rejected GLB upload: {err}");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            error!("Error saving GLB file: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save GLB file").into_response()
        }
    }
}

/// [`AssetStore`] backed by the public directory, so the server can build the
/// HBJSON layer without calling itself over HTTP.
pub struct DiskAssetStore {
    public_dir: PathBuf,
    uploads: Arc<GlbUploads>,
    http: reqwest::Client,
}

impl DiskAssetStore {
    pub fn new(public_dir: impl Into<PathBuf>, uploads: Arc<GlbUploads>, http: reqwest::Client) -> Self {
        Self {
            public_dir: public_dir.into(),
            uploads,
            http,
        }
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, AssetError> {
        let rel = Path::new(path.trim_start_matches('/'));
        let safe = rel
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(AssetError::Rejected(path.to_string()));
        }
        Ok(self.public_dir.join(rel))
    }
}

#[async_trait]
impl AssetStore for DiskAssetStore {
    async fn exists(&self, path: &str) -> Result<bool, AssetError> {
        Ok(tokio::fs::try_exists(self.local_path(path)?).await?)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let resp = self.http.get(url).send().await?;
            if !resp.status().is_success() {
                return Err(AssetError::Status {
                    url: url.to_string(),
                    status: resp.status().as_u16(),
                });
            }
            return Ok(resp.bytes().await?.to_vec());
        }
        Ok(tokio::fs::read(self.local_path(url)?).await?)
    }

    async fn save_glb(&self, name: &str, glb: Vec<u8>) -> Result<String, AssetError> {
        match self.uploads.save(name, Bytes::from(glb)).await {
            Ok(_) => Ok(served_path(name)),
            Err(UploadError::Io(err)) => Err(AssetError::Io(err)),
            Err(err) => Err(AssetError::Rejected(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use layers::assets::AssetStore;

    use super::{validate_name, DiskAssetStore, GlbUploads, SaveOutcome, UploadError};

    fn glb(generator: &str) -> Bytes {
        Bytes::from(formats::encode_glb(&[], generator).expect("glb"))
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("demo.glb").is_ok());
        assert!(validate_name("tree_v2-final.glb").is_ok());
        for bad in ["", ".glb", ".hidden.glb", "../demo.glb", "a/b.glb", "demo.gltf", "demo glb.glb"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_name(&format!("{}.glb", "a".repeat(200))).is_err());
    }

    #[tokio::test]
    async fn first_save_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = GlbUploads::new(dir.path().join("uploads"));

        let first = glb("first");
        assert_eq!(uploads.save("demo.glb", first.clone()).await.expect("save"), SaveOutcome::Created);
        assert_eq!(
            uploads.save("demo.glb", glb("second")).await.expect("save"),
            SaveOutcome::AlreadyExists
        );
        let on_disk = std::fs::read(dir.path().join("uploads/demo.glb")).expect("read");
        assert_eq!(on_disk, first.to_vec());
        assert!(uploads.exists("demo.glb").await.expect("exists"));
        assert!(!uploads.exists("tree.glb").await.expect("exists"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_create_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = Arc::new(GlbUploads::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let uploads = uploads.clone();
                tokio::spawn(async move { uploads.save("demo.glb", glb(&format!("writer-{i}"))).await })
            })
            .collect();
        let mut created = 0;
        for task in tasks {
            if task.await.expect("join").expect("save") == SaveOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn non_glb_body_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = GlbUploads::new(dir.path());
        let err = uploads
            .save("demo.glb", Bytes::from_static(b"not a model"))
            .await
            .expect_err("reject");
        assert!(matches!(err, UploadError::NotGlb));
    }

    #[tokio::test]
    async fn disk_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = Arc::new(GlbUploads::new(dir.path().join("uploads")));
        let store = DiskAssetStore::new(dir.path(), uploads, reqwest::Client::new());

        assert!(!store.exists("uploads/demo.glb").await.expect("exists"));
        let path = store.save_glb("demo.glb", glb("disk").to_vec()).await.expect("save");
        assert_eq!(path, "/uploads/demo.glb");
        assert!(store.exists("uploads/demo.glb").await.expect("exists"));
        assert!(store.exists("/uploads/demo.glb").await.expect("exists"));
        assert!(store.exists("../etc/passwd").await.is_err());

        std::fs::write(dir.path().join("model.hbjson"), b"{}").expect("write");
        assert_eq!(store.fetch("model.hbjson").await.expect("fetch"), b"{}");
    }
}
