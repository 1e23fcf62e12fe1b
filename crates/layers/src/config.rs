use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::colormap::ColormapConfig;
use crate::hbjson::HbjsonSource;
use crate::trees::DEFAULT_TREE_MODEL;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Stockholm;
/// 2019-03-01T14:00:00Z
pub const DEFAULT_SUN_TIME_MS: i64 = 1_551_448_800_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Mapbox access token is missing; set MAPBOX_TOKEN or REACT_APP_MAPBOX_ACCESS_TOKEN"
    )]
    MissingMapboxToken,
    #[error("unknown time zone: {0}")]
    InvalidTimezone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            longitude: 11.964164014667688,
            latitude: 57.707441012101015,
            zoom: 16.0,
            pitch: 45.0,
            bearing: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basemap {
    #[default]
    Light,
    Satellite,
    Terrain,
    Streets,
    Dark,
}

impl Basemap {
    pub const ALL: [Basemap; 5] = [
        Basemap::Light,
        Basemap::Satellite,
        Basemap::Terrain,
        Basemap::Streets,
        Basemap::Dark,
    ];

    pub fn style_url(self) -> &'static str {
        match self {
            Basemap::Light => "mapbox://styles/mapbox/light-v10",
            Basemap::Satellite => "mapbox://styles/mapbox/satellite-v9",
            Basemap::Terrain => "mapbox://styles/mapbox/outdoors-v11",
            Basemap::Streets => "mapbox://styles/mapbox/streets-v11",
            Basemap::Dark => "mapbox://styles/mapbox/dark-v10",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Basemap::Light => "Light",
            Basemap::Satellite => "Satellite",
            Basemap::Terrain => "Terrain",
            Basemap::Streets => "Streets",
            Basemap::Dark => "Dark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasemapOption {
    pub id: String,
    pub name: String,
}

impl From<Basemap> for BasemapOption {
    fn from(basemap: Basemap) -> Self {
        Self {
            id: basemap.style_url().to_string(),
            name: basemap.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSources {
    pub buildings: String,
    pub trees: String,
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            buildings: "sample-data.geojson".to_string(),
            trees: "trees.geojson".to_string(),
        }
    }
}

/// Everything the viewer front-end needs to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    pub initial_view: ViewState,
    pub basemap: Basemap,
    pub basemaps: Vec<BasemapOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapbox_token: Option<String>,
    pub timezone: Tz,
    pub default_sun_time: i64,
    pub data: DataSources,
    pub hbjson: HbjsonSource,
    pub tree_model: String,
    pub asset_base_url: String,
    pub save_endpoint: String,
    pub color_by_attributes: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_view: ViewState::default(),
            basemap: Basemap::default(),
            basemaps: Basemap::ALL.into_iter().map(BasemapOption::from).collect(),
            mapbox_token: None,
            timezone: DEFAULT_TIMEZONE,
            default_sun_time: DEFAULT_SUN_TIME_MS,
            data: DataSources::default(),
            hbjson: HbjsonSource::default(),
            tree_model: DEFAULT_TREE_MODEL.to_string(),
            asset_base_url: "http://localhost:3001".to_string(),
            save_endpoint: "http://localhost:3001/api/save-glb".to_string(),
            color_by_attributes: ColormapConfig::default()
                .attributes()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ViewerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup; unset or invalid
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        cfg.mapbox_token = var("MAPBOX_TOKEN").or_else(|| var("REACT_APP_MAPBOX_ACCESS_TOKEN"));
        if cfg.mapbox_token.is_none() {
            error!("{}", ConfigError::MissingMapboxToken);
        }

        if let Some(name) = var("CSD_TIMEZONE") {
            match parse_timezone(&name) {
                Ok(tz) => cfg.timezone = tz,
                Err(err) => warn!("{err}, keeping {}", cfg.timezone),
            }
        }
        if let Some(base) = var("CSD_ASSET_BASE_URL") {
            cfg.save_endpoint = format!("{}/api/save-glb", base.trim_end_matches('/'));
            cfg.asset_base_url = base;
        }
        if let Some(url) = var("CSD_HBJSON_URL") {
            cfg.hbjson.remote_url = url;
        }
        cfg
    }

    pub fn mapbox_token(&self) -> Result<&str, ConfigError> {
        self.mapbox_token.as_deref().ok_or(ConfigError::MissingMapboxToken)
    }

    /// `[lon, lat]` used for sun position calculations.
    pub fn sun_location(&self) -> [f64; 2] {
        [self.initial_view.longitude, self.initial_view.latitude]
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(name.to_string()))
}
