pub mod geojson;
pub mod glb;
pub mod hbjson;
pub mod mesh;
pub mod model;

pub use geojson::*;
pub use glb::{GlbError, GlbMesh, PbrMaterial, encode_glb, is_glb};
pub use hbjson::*;
pub use mesh::*;
pub use model::*;
