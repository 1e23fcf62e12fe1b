use std::path::Path;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formats::FeatureCollection;
use layers::compose::ComposeRequest;
use layers::symbology::LayerVisibility;
use serde::Deserialize;
use tracing::{error, warn};

use crate::AppState;

pub async fn viewer_config(State(state): State<AppState>) -> Response {
    Json(state.viewer.as_ref().clone()).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayersQuery {
    pub color_by: Option<String>,
    pub time: Option<i64>,
    pub hidden: Option<String>,
}

/// Composes the layer stack from the data files in the public directory.
pub async fn layer_stack(State(state): State<AppState>, Query(query): Query<LayersQuery>) -> Response {
    let buildings = load_collection(&state.public_dir, &state.viewer.data.buildings).await;
    let trees = load_collection(&state.public_dir, &state.viewer.data.trees).await;

    let request = ComposeRequest {
        buildings: &buildings,
        trees: &trees,
        color_by: query.color_by.as_deref().unwrap_or(""),
        timestamp_ms: query.time.unwrap_or(state.viewer.default_sun_time),
    };

    match state.composer.compose(request).await {
        Ok(stack) => {
            let visibility = query
                .hidden
                .as_deref()
                .map(LayerVisibility::from_hidden_list)
                .unwrap_or_default();
            Json(stack.with_visibility(&visibility)).into_response()
        }
        Err(err) => {
            warn!("layer composition rejected: {err}");
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
    }
}

/// Missing or malformed data degrades to an empty collection.
async fn load_collection(public_dir: &Path, rel: &str) -> FeatureCollection {
    let path = public_dir.join(rel.trim_start_matches('/'));
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("failed to load {}: {err}", path.display());
            return FeatureCollection::default();
        }
    };
    match FeatureCollection::from_geojson_slice(&bytes) {
        Ok(collection) => collection,
        Err(err) => {
            error!("failed to parse {}: {err}", path.display());
            FeatureCollection::default()
        }
    }
}
