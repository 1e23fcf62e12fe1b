use formats::{Feature, FeatureCollection, GeoPoint, Geometry};
use serde_json::{Map, Value};
use tracing::warn;

use crate::layer::{Accessor, GeoJsonLayer};
use crate::symbology::TRANSPARENT;

pub const LAND_COVER_LAYER_ID: &str = "land-cover";

/// Closed rectangle around every vertex of `data`, flagged as a floor so
/// the building styling keeps it invisible.
pub fn bounding_box_feature(data: &FeatureCollection) -> Option<Feature> {
    let bounds = data.lon_lat_bounds()?;
    let ring = bounds
        .closed_ring()
        .iter()
        .map(|[lon, lat]| GeoPoint::new(*lon, *lat))
        .collect();

    let mut properties = Map::new();
    properties.insert("isFloor".to_string(), Value::Bool(true));
    properties.insert("footprint_extrusion".to_string(), Value::from(0));

    Some(Feature {
        id: None,
        properties,
        geometry: Some(Geometry::Polygon(vec![ring])),
    })
}

/// Transparent ground plane covering the extent of `data`.
pub fn create_land_cover_layer(data: &FeatureCollection) -> Option<GeoJsonLayer> {
    let Some(feature) = bounding_box_feature(data) else {
        warn!("land cover skipped: no coordinates in collection");
        return None;
    };
    let mut layer = GeoJsonLayer::new(
        LAND_COVER_LAYER_ID,
        FeatureCollection {
            features: vec![feature],
        },
        TRANSPARENT,
    );
    layer.get_line_color = Some(Accessor::Constant(TRANSPARENT));
    Some(layer)
}

#[cfg(test)]
mod tests {
    use super::{bounding_box_feature, create_land_cover_layer};
    use formats::{FeatureCollection, Geometry};
    use pretty_assertions::assert_eq;

    #[test]
    fn box_corners_follow_extent() {
        let data = FeatureCollection::from_geojson_str(
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Polygon", "coordinates": [[[11.0,57.5],[12.0,57.5],[12.0,58.0],[11.0,57.5]]] } },
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Point", "coordinates": [10.5, 57.9, 12.0] } }
            ]}"#,
        )
        .expect("geojson");

        let feature = bounding_box_feature(&data).expect("bbox");
        assert!(feature.flag("isFloor"));
        assert_eq!(feature.property_f64("footprint_extrusion"), Some(0.0));
        let Some(Geometry::Polygon(rings)) = &feature.geometry else {
            panic!("expected polygon");
        };
        let corners: Vec<[f64; 2]> = rings[0].iter().map(|p| p.lon_lat()).collect();
        assert_eq!(
            corners,
            vec![[10.5, 57.5], [12.0, 57.5], [12.0, 58.0], [10.5, 58.0], [10.5, 57.5]]
        );
    }

    #[test]
    fn layer_is_transparent() {
        let data = FeatureCollection::from_geojson_str(
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [1, 2] } }
            ]}"#,
        )
        .expect("geojson");
        let layer = create_land_cover_layer(&data).expect("layer");
        let v = serde_json::to_value(&layer).expect("json");
        assert_eq!(v["id"], "land-cover");
        assert_eq!(v["getFillColor"], serde_json::json!([0, 0, 0, 0]));
        assert_eq!(v["getLineColor"], serde_json::json!([0, 0, 0, 0]));
        assert_eq!(v["pickable"], false);
    }

    #[test]
    fn empty_collection_has_no_layer() {
        assert!(create_land_cover_layer(&FeatureCollection::default()).is_none());
    }
}
