use std::collections::BTreeMap;

use formats::{Feature, FeatureCollection};
use serde_json::Value;
use tracing::debug;

use crate::colormap::{ColormapConfig, ValueRange};
use crate::layer::{Accessor, GeoJsonLayer, LayerId};
use crate::symbology::{LightingMaterial, Rgba, TRANSPARENT, WHITE};

pub const BUILDINGS_LAYER_ID: &str = "buildings";

/// Value range of `color_by` over the collection. Missing values count as
/// zero; non-numeric values are ignored.
pub fn attribute_range(data: &FeatureCollection, color_by: &str) -> ValueRange {
    ValueRange::from_values(data.features.iter().filter_map(|f| match f.property(color_by) {
        None => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    }))
}

/// Fill colour of a single building.
pub fn building_fill_color(
    feature: &Feature,
    color_by: &str,
    range: ValueRange,
    colormaps: &ColormapConfig,
) -> Rgba {
    if feature.flag("isFloor") {
        return TRANSPARENT;
    }
    if color_by.is_empty() {
        return WHITE;
    }
    feature
        .property(color_by)
        .and_then(|value| colormaps.color_for_value(color_by, value, range))
        .unwrap_or(WHITE)
}

pub fn building_elevation(feature: &Feature) -> f64 {
    feature
        .property_f64("height")
        .filter(|h| h.is_finite())
        .unwrap_or(0.0)
}

/// Extruded building footprints coloured by `color_by` (empty for none).
pub fn create_building_layer(
    data: &FeatureCollection,
    color_by: &str,
    colormaps: &ColormapConfig,
) -> GeoJsonLayer {
    debug!(color_by, features = data.len(), "creating building layer");

    let range = attribute_range(data, color_by);
    let fill = data
        .features
        .iter()
        .map(|f| building_fill_color(f, color_by, range, colormaps))
        .collect();
    let elevation = data.features.iter().map(building_elevation).collect();

    let mut update_triggers = BTreeMap::new();
    update_triggers.insert("getFillColor".to_string(), color_by.to_string());
    update_triggers.insert("getElevation".to_string(), "height".to_string());

    GeoJsonLayer {
        id: LayerId::new(BUILDINGS_LAYER_ID),
        data: data.clone(),
        extruded: true,
        wireframe: true,
        opacity: 1.0,
        pickable: true,
        get_fill_color: Accessor::PerFeature(fill),
        get_line_color: None,
        get_elevation: Some(Accessor::PerFeature(elevation)),
        get_point_radius: None,
        point_radius_min_pixels: None,
        get_line_width: None,
        material: Some(LightingMaterial::default()),
        update_triggers,
    }
}

/// Hover text for a building, one attribute per line.
pub fn tooltip_text(feature: &Feature) -> String {
    let field = |key: &str| -> String {
        match feature.property(key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v != 0.0) => n.to_string(),
            Some(Value::Bool(true)) => "true".to_string(),
            _ => "N/A".to_string(),
        }
    };
    [
        format!("Name: {}", field("name")),
        format!("Type: {}", field("type")),
        format!("Height: {} m", field("height")),
        format!("Function: {}", field("function")),
        format!("Floors: {}", field("floors")),
    ]
    .join("\n")
}
