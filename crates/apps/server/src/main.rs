use std::env;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use layers::colormap::ColormapConfig;
use layers::compose::LayerComposer;
use layers::config::ViewerConfig;
use layers::hbjson::GlbCache;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod layers_api;
mod uploads;

use uploads::{DiskAssetStore, GlbUploads, UPLOADS_DIR};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    uploads: Arc<GlbUploads>,
    viewer: Arc<ViewerConfig>,
    composer: Arc<LayerComposer>,
    public_dir: PathBuf,
}

impl AppState {
    fn new(public_dir: PathBuf, viewer: ViewerConfig, http: reqwest::Client) -> Self {
        let uploads = Arc::new(GlbUploads::new(public_dir.join(UPLOADS_DIR)));
        let store = Arc::new(DiskAssetStore::new(&public_dir, uploads.clone(), http));
        let cache = Arc::new(GlbCache::new(store));
        let composer = LayerComposer::from_config(&viewer, ColormapConfig::default())
            .with_hbjson(cache, viewer.hbjson.clone());
        Self {
            uploads,
            viewer: Arc::new(viewer),
            composer: Arc::new(composer),
            public_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let port = env_var_u16("PORT", DEFAULT_PORT);
    let public_dir = env::var("CSD_PUBLIC_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("public"));
    let max_upload = env_var_usize("CSD_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);

    let state = AppState::new(public_dir, ViewerConfig::from_env(), reqwest::Client::new());
    if let Err(err) = tokio::fs::create_dir_all(state.uploads.dir()).await {
        warn!("failed to create uploads dir: {err}");
    }

    let app = router(state, max_upload);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is running on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState, max_upload: usize) -> Router {
    let static_files = ServeDir::new(&state.public_dir);
    Router::new()
        .route("/", get(root))
        .route("/api/save-glb", post(uploads::save_glb))
        .route("/api/viewer-config", get(layers_api::viewer_config))
        .route("/api/layers", get(layers_api::layer_stack))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Response {
    (StatusCode::OK, "Server is running").into_response()
}

fn env_var_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
