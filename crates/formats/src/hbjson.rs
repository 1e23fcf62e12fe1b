//! Honeybee JSON (HBJSON) building model, the subset needed for geometry.
//!
//! Unknown fields (energy/radiance properties, boundary conditions, ...) are
//! ignored during deserialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub orphaned_faces: Vec<Face>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    #[default]
    Meters,
    Millimeters,
    Centimeters,
    Feet,
    Inches,
}

impl Units {
    pub fn to_meters(self) -> f64 {
        match self {
            Units::Meters => 1.0,
            Units::Millimeters => 0.001,
            Units::Centimeters => 0.01,
            Units::Feet => 0.3048,
            Units::Inches => 0.0254,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub faces: Vec<Face>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub face_type: FaceType,
    #[serde(default)]
    pub geometry: Face3D,
    #[serde(default)]
    pub apertures: Vec<Aperture>,
    #[serde(default)]
    pub doors: Vec<Door>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceType {
    #[default]
    Wall,
    Floor,
    RoofCeiling,
    AirBoundary,
    #[serde(other)]
    Other,
}

/// Planar polygon. `boundary` is counter-clockwise when seen from the side
/// the face normal points to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Face3D {
    #[serde(default)]
    pub boundary: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Vec<[f64; 3]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub geometry: Face3D,
    #[serde(default)]
    pub is_operable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Door {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub geometry: Face3D,
    #[serde(default)]
    pub is_glass: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum HbjsonError {
    #[error("HBJSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Model {
    pub fn from_json_str(payload: &str) -> Result<Self, HbjsonError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn from_json_slice(payload: &[u8]) -> Result<Self, HbjsonError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Room faces followed by orphaned faces.
    pub fn faces(&self) -> impl Iterator<Item = &Face> {
        self.rooms
            .iter()
            .flat_map(|room| room.faces.iter())
            .chain(self.orphaned_faces.iter())
    }

    pub fn face_count(&self) -> usize {
        self.faces().count()
    }
}
