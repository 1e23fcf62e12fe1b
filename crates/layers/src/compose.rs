use std::sync::Arc;

use chrono_tz::Tz;
use formats::FeatureCollection;
use serde::Serialize;
use tracing::{debug, error};

use crate::buildings::create_building_layer;
use crate::colormap::ColormapConfig;
use crate::config::{DEFAULT_TIMEZONE, ViewerConfig};
use crate::hbjson::{GlbCache, HbjsonSource, create_hbjson_layer};
use crate::land_cover::create_land_cover_layer;
use crate::layer::{Layer, LayerDescriptor};
use crate::lighting::{LightingEffect, TimeError, TimeOfDay};
use crate::symbology::LayerVisibility;
use crate::trees::{
    DEFAULT_TREE_MODEL, TREE_LAYER_ID, TREE_POINTS_LAYER_ID, create_tree_layer,
    create_tree_points_layer,
};

/// Inputs of one composition.
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    pub buildings: &'a FeatureCollection,
    pub trees: &'a FeatureCollection,
    /// Attribute to colour buildings by; empty for none.
    pub color_by: &'a str,
    pub timestamp_ms: i64,
}

/// Ordered layers plus the lighting derived from the same timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStack {
    pub layers: Vec<LayerDescriptor>,
    pub time_of_day: TimeOfDay,
    pub lighting: LightingEffect,
}

impl LayerStack {
    pub fn ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id().as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&LayerDescriptor> {
        self.layers.iter().find(|l| l.id().as_str() == id)
    }

    pub fn with_visibility(mut self, visibility: &LayerVisibility) -> Self {
        self.layers = filter_visible(self.layers, visibility);
        self
    }
}

/// Drops layers hidden in `visibility`, keeping order.
pub fn filter_visible(layers: Vec<LayerDescriptor>, visibility: &LayerVisibility) -> Vec<LayerDescriptor> {
    layers
        .into_iter()
        .filter(|l| visibility.is_visible(l.id().as_str()))
        .collect()
}

pub struct LayerComposer {
    colormaps: ColormapConfig,
    timezone: Tz,
    sun_location: [f64; 2],
    tree_model: String,
    hbjson: Option<(Arc<GlbCache>, HbjsonSource)>,
}

impl Default for LayerComposer {
    fn default() -> Self {
        let view = crate::config::ViewState::default();
        Self {
            colormaps: ColormapConfig::default(),
            timezone: DEFAULT_TIMEZONE,
            sun_location: [view.longitude, view.latitude],
            tree_model: DEFAULT_TREE_MODEL.to_string(),
            hbjson: None,
        }
    }
}

impl LayerComposer {
    pub fn new(colormaps: ColormapConfig, timezone: Tz) -> Self {
        Self {
            colormaps,
            timezone,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ViewerConfig, colormaps: ColormapConfig) -> Self {
        Self {
            colormaps,
            timezone: config.timezone,
            sun_location: config.sun_location(),
            tree_model: config.tree_model.clone(),
            hbjson: None,
        }
    }

    pub fn with_hbjson(mut self, cache: Arc<GlbCache>, source: HbjsonSource) -> Self {
        self.hbjson = Some((cache, source));
        self
    }

    pub fn with_tree_model(mut self, url: impl Into<String>) -> Self {
        self.tree_model = url.into();
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Builds the layer stack: buildings, land cover, tree points, trees,
    /// then the HBJSON model. Layers that cannot be built are left out.
    pub async fn compose(&self, request: ComposeRequest<'_>) -> Result<LayerStack, TimeError> {
        let time_of_day = TimeOfDay::at(request.timestamp_ms, self.timezone)?;
        let lighting = LightingEffect::at(request.timestamp_ms, time_of_day, self.sun_location);

        let hbjson: Option<LayerDescriptor> = match &self.hbjson {
            Some((cache, source)) => match create_hbjson_layer(cache, source).await {
                Ok(layer) => Some(layer.into()),
                Err(err) => {
                    error!("HBJSON layer creation failed: {err}");
                    None
                }
            },
            None => None,
        };

        let layers: Vec<LayerDescriptor> = [
            Some(LayerDescriptor::from(create_building_layer(
                request.buildings,
                request.color_by,
                &self.colormaps,
            ))),
            create_land_cover_layer(request.buildings).map(LayerDescriptor::from),
            Some(LayerDescriptor::from(create_tree_points_layer(
                request.trees,
                TREE_POINTS_LAYER_ID,
            ))),
            create_tree_layer(request.trees, TREE_LAYER_ID, &self.tree_model).map(LayerDescriptor::from),
            hbjson,
        ]
        .into_iter()
        .flatten()
        .collect();

        debug!(
            count = layers.len(),
            time_of_day = time_of_day.as_str(),
            "layer stack composed"
        );
        Ok(LayerStack {
            layers,
            time_of_day,
            lighting,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use super::{ComposeRequest, LayerComposer, filter_visible};
    use crate::colormap::ColormapConfig;
    use crate::hbjson::tests::FakeStore;
    use crate::hbjson::{GlbCache, HbjsonSource};
    use crate::lighting::TimeOfDay;
    use crate::symbology::LayerVisibility;
    use formats::FeatureCollection;
    use pretty_assertions::assert_eq;

    const DAY: i64 = 1_551_448_800_000;
    const NIGHT: i64 = DAY + 6 * 3_600_000;

    fn buildings() -> FeatureCollection {
        FeatureCollection::from_geojson_str(
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": { "height": 12, "EPC_class": "C" },
                  "geometry": { "type": "Polygon", "coordinates": [[[11.96,57.70],[11.97,57.70],[11.97,57.71],[11.96,57.70]]] } }
            ]}"#,
        )
        .expect("buildings")
    }

    fn trees() -> FeatureCollection {
        FeatureCollection::from_geojson_str(
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [11.965, 57.705] } }
            ]}"#,
        )
        .expect("trees")
    }

    #[tokio::test]
    async fn full_stack_in_fixed_order() {
        let store = Arc::new(FakeStore::with_model());
        let cache = Arc::new(GlbCache::new(store.clone()));
        let composer = LayerComposer::default().with_hbjson(cache, HbjsonSource::default());
        let (b, t) = (buildings(), trees());

        let stack = composer
            .compose(ComposeRequest {
                buildings: &b,
                trees: &t,
                color_by: "EPC_class",
                timestamp_ms: DAY,
            })
            .await
            .expect("compose");

        assert_eq!(
            stack.ids(),
            vec!["buildings", "land-cover", "tree-points-layer", "tree-layer", "hbjson-glb-layer"]
        );
        assert_eq!(stack.time_of_day, TimeOfDay::Day);
        assert_eq!(stack.lighting.sun_light.intensity, 2.8);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_layers_are_dropped() {
        let store = Arc::new(FakeStore::default());
        let cache = Arc::new(GlbCache::new(store));
        let composer = LayerComposer::new(ColormapConfig::default(), chrono_tz::Europe::Stockholm)
            .with_hbjson(cache, HbjsonSource::default());
        let empty = FeatureCollection::default();

        let stack = composer
            .compose(ComposeRequest {
                buildings: &empty,
                trees: &empty,
                color_by: "",
                timestamp_ms: NIGHT,
            })
            .await
            .expect("compose");

        // No coordinates: no land cover; no trees: no scenegraph; fetch fails: no model.
        assert_eq!(stack.ids(), vec!["buildings", "tree-points-layer"]);
        assert_eq!(stack.time_of_day, TimeOfDay::Night);
    }

    #[tokio::test]
    async fn visibility_filter_keeps_order() {
        let (b, t) = (buildings(), trees());
        let stack = LayerComposer::default()
            .compose(ComposeRequest {
                buildings: &b,
                trees: &t,
                color_by: "height",
                timestamp_ms: DAY,
            })
            .await
            .expect("compose");

        let vis = LayerVisibility::from_hidden_list("land-cover,unknown");
        let visible = filter_visible(stack.layers.clone(), &vis);
        let ids: Vec<_> = visible.iter().map(|l| crate::layer::Layer::id(l).as_str()).collect();
        assert_eq!(ids, vec!["buildings", "tree-points-layer", "tree-layer"]);

        let filtered = stack.with_visibility(&LayerVisibility::from_hidden_list("buildings"));
        assert!(filtered.get("buildings").is_none());
        assert!(filtered.get("tree-layer").is_some());
    }

    #[tokio::test]
    async fn out_of_range_timestamp_is_rejected() {
        let empty = FeatureCollection::default();
        let result = LayerComposer::default()
            .compose(ComposeRequest {
                buildings: &empty,
                trees: &empty,
                color_by: "",
                timestamp_ms: i64::MAX,
            })
            .await;
        assert!(result.is_err());
    }
}
