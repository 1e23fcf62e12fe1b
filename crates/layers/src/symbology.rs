use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 8-bit RGBA as consumed by deck.gl colour accessors.
pub type Rgba = [u8; 4];
pub type Rgb = [u8; 3];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];
pub const WHITE: Rgba = [255, 255, 255, 255];
pub const GRAY: Rgb = [0x80, 0x80, 0x80];

/// Phong-style material applied to extruded GeoJSON layers.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingMaterial {
    pub ambient: f32,
    pub diffuse: f32,
    pub shininess: f32,
    pub specular_color: Rgb,
}

impl LightingMaterial {
    pub const fn new(ambient: f32, diffuse: f32, shininess: f32, specular_color: Rgb) -> Self {
        Self {
            ambient,
            diffuse,
            shininess,
            specular_color,
        }
    }
}

impl Default for LightingMaterial {
    fn default() -> Self {
        Self::new(0.3, 0.2, 10.0, [150, 180, 180])
    }
}

/// Per-layer visibility toggles. Layers are visible unless hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerVisibility {
    hidden: BTreeSet<String>,
}

impl LayerVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma separated list of hidden layer ids.
    pub fn from_hidden_list(list: &str) -> Self {
        let hidden = list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Self { hidden }
    }

    pub fn set_visible(&mut self, id: &str, visible: bool) {
        if visible {
            self.hidden.remove(id);
        } else {
            self.hidden.insert(id.to_string());
        }
    }

    pub fn toggle(&mut self, id: &str) -> bool {
        let now_visible = !self.is_visible(id);
        self.set_visible(id, now_visible);
        now_visible
    }

    pub fn is_visible(&self, id: &str) -> bool {
        !self.hidden.contains(id)
    }

    pub fn hidden(&self) -> impl Iterator<Item = &str> {
        self.hidden.iter().map(String::as_str)
    }
}

pub(crate) fn hex_rgb(hex: u32) -> Rgb {
    [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8]
}

pub(crate) fn with_alpha(rgb: Rgb, alpha: u8) -> Rgba {
    [rgb[0], rgb[1], rgb[2], alpha]
}
