pub mod assets;
pub mod buildings;
pub mod colormap;
pub mod compose;
pub mod config;
pub mod hbjson;
pub mod land_cover;
pub mod layer;
pub mod lighting;
pub mod stats;
pub mod symbology;
pub mod trees;

pub use layer::*;
