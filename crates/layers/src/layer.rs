use std::collections::BTreeMap;
use std::fmt;

use formats::FeatureCollection;
use serde::{Deserialize, Serialize, Serializer};

use crate::symbology::{LightingMaterial, Rgba};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Layer {
    fn id(&self) -> &LayerId;
}

/// A style value that is either shared by every feature or resolved per
/// feature (same order as the layer data).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Accessor<T> {
    Constant(T),
    PerFeature(Vec<T>),
}

impl<T: Clone> Accessor<T> {
    /// Value used for the feature at `index`.
    pub fn at(&self, index: usize) -> Option<T> {
        match self {
            Accessor::Constant(v) => Some(v.clone()),
            Accessor::PerFeature(values) => values.get(index).cloned(),
        }
    }
}

/// Serialisable description of a deck.gl `GeoJsonLayer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonLayer {
    pub id: LayerId,
    #[serde(serialize_with = "serialize_collection")]
    pub data: FeatureCollection,
    pub extruded: bool,
    pub wireframe: bool,
    pub opacity: f32,
    pub pickable: bool,
    pub get_fill_color: Accessor<Rgba>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_line_color: Option<Accessor<Rgba>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_elevation: Option<Accessor<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_point_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_radius_min_pixels: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_line_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<LightingMaterial>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub update_triggers: BTreeMap<String, String>,
}

impl GeoJsonLayer {
    /// Flat, non-pickable layer with a single fill colour.
    pub fn new(id: impl Into<String>, data: FeatureCollection, fill: Rgba) -> Self {
        Self {
            id: LayerId::new(id),
            data,
            extruded: false,
            wireframe: false,
            opacity: 1.0,
            pickable: false,
            get_fill_color: Accessor::Constant(fill),
            get_line_color: None,
            get_elevation: None,
            get_point_radius: None,
            point_radius_min_pixels: None,
            get_line_width: None,
            material: None,
            update_triggers: BTreeMap::new(),
        }
    }
}

impl Layer for GeoJsonLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }
}

/// One placed copy of a scenegraph model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInstance {
    /// `[lon, lat, alt]`.
    pub position: [f64; 3],
    /// `[pitch, yaw, roll]` in degrees.
    pub orientation: [f64; 3],
    pub scale: [f64; 3],
}

/// Serialisable description of a deck.gl `ScenegraphLayer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenegraphLayer {
    pub id: LayerId,
    /// URL of the glTF/GLB model.
    pub scenegraph: String,
    pub data: Vec<SceneInstance>,
    pub size_scale: f64,
    pub pickable: bool,
    #[serde(rename = "_lighting")]
    pub lighting: String,
}

impl ScenegraphLayer {
    pub fn new(id: impl Into<String>, scenegraph: impl Into<String>, data: Vec<SceneInstance>) -> Self {
        Self {
            id: LayerId::new(id),
            scenegraph: scenegraph.into(),
            data,
            size_scale: 1.0,
            pickable: false,
            lighting: "pbr".to_string(),
        }
    }
}

impl Layer for ScenegraphLayer {
    fn id(&self) -> &LayerId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum LayerDescriptor {
    #[serde(rename = "GeoJsonLayer")]
    GeoJson(GeoJsonLayer),
    #[serde(rename = "ScenegraphLayer")]
    Scenegraph(ScenegraphLayer),
}

impl Layer for LayerDescriptor {
    fn id(&self) -> &LayerId {
        match self {
            LayerDescriptor::GeoJson(layer) => layer.id(),
            LayerDescriptor::Scenegraph(layer) => layer.id(),
        }
    }
}

impl From<GeoJsonLayer> for LayerDescriptor {
    fn from(layer: GeoJsonLayer) -> Self {
        LayerDescriptor::GeoJson(layer)
    }
}

impl From<ScenegraphLayer> for LayerDescriptor {
    fn from(layer: ScenegraphLayer) -> Self {
        LayerDescriptor::Scenegraph(layer)
    }
}

fn serialize_collection<S: Serializer>(data: &FeatureCollection, s: S) -> Result<S::Ok, S::Error> {
    data.to_geojson_value().serialize(s)
}

#[cfg(test)]
mod tests {
    use super::{Accessor, GeoJsonLayer, Layer, LayerDescriptor, ScenegraphLayer};
    use formats::FeatureCollection;
    use pretty_assertions::assert_eq;

    #[test]
    fn descriptor_serializes_with_type_tag() {
        let layer: LayerDescriptor =
            GeoJsonLayer::new("land-cover", FeatureCollection::default(), [0, 0, 0, 0]).into();
        let v = serde_json::to_value(&layer).expect("serialize");
        assert_eq!(v["type"], "GeoJsonLayer");
        assert_eq!(v["id"], "land-cover");
        assert_eq!(v["data"]["type"], "FeatureCollection");
        assert_eq!(v["getFillColor"], serde_json::json!([0, 0, 0, 0]));
        assert!(v.get("getElevation").is_none());
    }

    #[test]
    fn scenegraph_defaults() {
        let layer = ScenegraphLayer::new("tree-layer", "tree.glb", Vec::new());
        assert_eq!(layer.id().as_str(), "tree-layer");
        let v = serde_json::to_value(LayerDescriptor::from(layer)).expect("serialize");
        assert_eq!(v["type"], "ScenegraphLayer");
        assert_eq!(v["_lighting"], "pbr");
        assert_eq!(v["sizeScale"], 1.0);
    }

    #[test]
    fn accessor_lookup() {
        assert_eq!(Accessor::Constant(3).at(10), Some(3));
        assert_eq!(Accessor::PerFeature(vec![1, 2]).at(1), Some(2));
        assert_eq!(Accessor::PerFeature(vec![1, 2]).at(2), None);
    }
}
