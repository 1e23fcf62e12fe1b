use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use formats::{GlbError, HbjsonError, Model, hbjson_to_glb};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::assets::{AssetError, AssetStore};
use crate::layer::{SceneInstance, ScenegraphLayer};

pub const HBJSON_LAYER_ID: &str = "hbjson-glb-layer";

#[derive(Debug, thiserror::Error)]
pub enum HbjsonLayerError {
    #[error("asset store: {0}")]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Parse(#[from] HbjsonError),
    #[error("GLB export failed: {0}")]
    Export(#[from] GlbError),
    #[error("conversion worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Where the architectural model comes from and where its GLB is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HbjsonSource {
    /// Path checked before converting.
    pub cached_path: String,
    pub remote_url: String,
    /// File name the converted model is saved under.
    pub glb_name: String,
    /// `[lon, lat, alt]` of the model origin.
    pub position: [f64; 3],
}

impl Default for HbjsonSource {
    fn default() -> Self {
        Self {
            cached_path: "uploads/demo.glb".to_string(),
            remote_url: "https://raw.githubusercontent.com/ladybug-tools/honeybee-schema/refs/heads/master/samples/model_large/lab_building.hbjson".to_string(),
            glb_name: "demo.glb".to_string(),
            position: [11.9690435, 57.7068985, 0.0],
        }
    }
}

/// Resolves HBJSON sources to served GLB paths. Concurrent resolutions of
/// the same cached path share one conversion, and a resolved path is
/// remembered for the lifetime of the cache.
pub struct GlbCache {
    store: Arc<dyn AssetStore>,
    entries: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl GlbCache {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    fn entry(&self, key: &str) -> Arc<OnceCell<String>> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.entry(key.to_string()).or_default().clone()
    }

    pub async fn resolve(&self, source: &HbjsonSource) -> Result<String, HbjsonLayerError> {
        let cell = self.entry(&source.cached_path);
        let path = cell.get_or_try_init(|| self.resolve_uncached(source)).await?;
        Ok(path.clone())
    }

    async fn resolve_uncached(&self, source: &HbjsonSource) -> Result<String, HbjsonLayerError> {
        match self.store.exists(&source.cached_path).await {
            Ok(true) => {
                info!(path = %source.cached_path, "using cached GLB");
                return Ok(source.cached_path.clone());
            }
            Ok(false) => {}
            Err(err) => warn!(path = %source.cached_path, "cache check failed, converting: {err}"),
        }

        let payload = self.store.fetch(&source.remote_url).await?;
        info!(url = %source.remote_url, bytes = payload.len(), "converting HBJSON to GLB");
        let glb = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, HbjsonLayerError> {
            let model = Model::from_json_slice(&payload)?;
            Ok(hbjson_to_glb(&model)?)
        })
        .await??;

        let saved = self.store.save_glb(&source.glb_name, glb).await?;
        info!(path = %saved, "GLB saved");
        Ok(saved)
    }
}

pub fn hbjson_scenegraph_layer(position: [f64; 3], scenegraph: impl Into<String>) -> ScenegraphLayer {
    ScenegraphLayer::new(
        HBJSON_LAYER_ID,
        scenegraph,
        vec![SceneInstance {
            position,
            orientation: [0.0, 0.0, 90.0],
            scale: [1.0, 1.0, 1.0],
        }],
    )
}

/// Places the converted model, converting and uploading it on a cache miss.
pub async fn create_hbjson_layer(
    cache: &GlbCache,
    source: &HbjsonSource,
) -> Result<ScenegraphLayer, HbjsonLayerError> {
    let path = cache.resolve(source).await?;
    Ok(hbjson_scenegraph_layer(source.position, path))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{GlbCache, HbjsonLayerError, HbjsonSource, create_hbjson_layer};
    use crate::assets::{AssetError, AssetStore};

    pub(crate) const SMALL_MODEL: &str = r#"{
        "identifier": "box",
        "rooms": [{ "identifier": "r", "faces": [
            { "identifier": "floor", "face_type": "Floor",
              "geometry": { "boundary": [[0,0,0],[0,5,0],[5,5,0],[5,0,0]] } }
        ]}]
    }"#;

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub cached: AtomicBool,
        pub exists_calls: AtomicUsize,
        pub fetch_calls: AtomicUsize,
        pub save_calls: AtomicUsize,
        pub payload: Option<&'static str>,
    }

    impl FakeStore {
        pub(crate) fn with_model() -> Self {
            Self {
                payload: Some(SMALL_MODEL),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AssetStore for FakeStore {
        async fn exists(&self, _path: &str) -> Result<bool, AssetError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cached.load(Ordering::SeqCst))
        }

        async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            match self.payload {
                Some(p) => Ok(p.as_bytes().to_vec()),
                None => Err(AssetError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }

        async fn save_glb(&self, name: &str, glb: Vec<u8>) -> Result<String, AssetError> {
            assert!(formats::is_glb(&glb));
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            self.cached.store(true, Ordering::SeqCst);
            Ok(format!("/uploads/{name}"))
        }
    }

    #[tokio::test]
    async fn cache_hit_issues_no_save() {
        let store = Arc::new(FakeStore::with_model());
        store.cached.store(true, Ordering::SeqCst);
        let cache = GlbCache::new(store.clone());
        let source = HbjsonSource::default();

        for _ in 0..3 {
            let layer = create_hbjson_layer(&cache, &source).await.expect("layer");
            assert_eq!(layer.scenegraph, "uploads/demo.glb");
            assert_eq!(layer.data[0].position, [11.9690435, 57.7068985, 0.0]);
            assert_eq!(layer.data[0].orientation, [0.0, 0.0, 90.0]);
        }
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn miss_converts_and_saves_once() {
        let store = Arc::new(FakeStore::with_model());
        let cache = GlbCache::new(store.clone());
        let source = HbjsonSource::default();

        let first = create_hbjson_layer(&cache, &source).await.expect("layer");
        let second = create_hbjson_layer(&cache, &source).await.expect("layer");
        assert_eq!(first.scenegraph, "/uploads/demo.glb");
        assert_eq!(second.scenegraph, "/uploads/demo.glb");
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_conversion() {
        let store = Arc::new(FakeStore::with_model());
        let cache = Arc::new(GlbCache::new(store.clone()));
        let source = HbjsonSource::default();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let source = source.clone();
                tokio::spawn(async move { cache.resolve(&source).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.expect("join").expect("resolve"), "/uploads/demo.glb");
        }
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_surface_and_are_retried() {
        let store = Arc::new(FakeStore::default());
        let cache = GlbCache::new(store.clone());
        let err = create_hbjson_layer(&cache, &HbjsonSource::default())
            .await
            .expect_err("fetch fails");
        assert!(matches!(err, HbjsonLayerError::Asset(_)));

        let _ = cache.resolve(&HbjsonSource::default()).await;
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_hbjson_is_a_parse_error() {
        let store = Arc::new(FakeStore {
            payload: Some("not json"),
            ..FakeStore::default()
        });
        let cache = GlbCache::new(store.clone());
        let err = cache.resolve(&HbjsonSource::default()).await.expect_err("parse");
        assert!(matches!(err, HbjsonLayerError::Parse(_)));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }
}
