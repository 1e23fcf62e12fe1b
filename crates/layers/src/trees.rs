use formats::{FeatureCollection, GeoPoint, Geometry};
use tracing::{error, warn};

use crate::layer::{GeoJsonLayer, SceneInstance, ScenegraphLayer};

pub const TREE_LAYER_ID: &str = "tree-layer";
pub const TREE_POINTS_LAYER_ID: &str = "tree-points-layer";
pub const DEFAULT_TREE_MODEL: &str = "tree.glb";

const TREE_FILL: [u8; 4] = [0, 200, 0, 255];

/// Two stable pseudo-random numbers in `[0, 1)` derived from a position, so a
/// tree keeps its look across recompositions.
fn jitter(point: &GeoPoint) -> (f64, f64) {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&point.lon_deg.to_le_bytes());
    hasher.update(&point.lat_deg.to_le_bytes());
    hasher.update(&point.alt_m.unwrap_or(0.0).to_le_bytes());
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    let unit = |chunk: &[u8]| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        (u64::from_le_bytes(raw) >> 11) as f64 / (1u64 << 53) as f64
    };
    (unit(&bytes[0..8]), unit(&bytes[8..16]))
}

pub fn tree_instance(point: &GeoPoint) -> SceneInstance {
    let (yaw, size) = jitter(point);
    let scale = 0.8 + size * 0.3;
    SceneInstance {
        position: [point.lon_deg, point.lat_deg, point.alt_m.unwrap_or(0.0)],
        orientation: [0.0, yaw * 10.0 - 5.0, 90.0],
        scale: [scale, scale, scale],
    }
}

/// Instanced 3D trees, one per point feature. `None` without features.
pub fn create_tree_layer(
    data: &FeatureCollection,
    id: &str,
    model_url: &str,
) -> Option<ScenegraphLayer> {
    if data.is_empty() {
        error!("invalid tree data provided: no features");
        return None;
    }

    let mut instances = Vec::with_capacity(data.len());
    for (index, feature) in data.features.iter().enumerate() {
        match &feature.geometry {
            Some(Geometry::Point(p)) => instances.push(tree_instance(p)),
            Some(Geometry::MultiPoint(points)) => instances.extend(points.iter().map(tree_instance)),
            _ => warn!(index, "tree feature without point geometry skipped"),
        }
    }

    Some(ScenegraphLayer::new(id, model_url, instances))
}

/// Lightweight green dots at every tree position.
pub fn create_tree_points_layer(data: &FeatureCollection, id: &str) -> GeoJsonLayer {
    let mut layer = GeoJsonLayer::new(id, data.clone(), TREE_FILL);
    layer.get_point_radius = Some(4.0);
    layer.point_radius_min_pixels = Some(2.0);
    layer.get_line_width = Some(1.0);
    layer
}
