use std::collections::BTreeMap;

use formats::FeatureCollection;
use serde::Serialize;
use serde_json::Value;

/// Summary figures behind the building charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingStats {
    pub total_buildings: usize,
    pub total_area: f64,
    pub avg_height: f64,
    pub function_distribution: BTreeMap<String, usize>,
    pub area_distribution: Vec<f64>,
    pub height_distribution: Vec<f64>,
}

impl BuildingStats {
    pub fn from_collection(data: &FeatureCollection) -> Self {
        if data.is_empty() {
            return Self::default();
        }

        let number = |v: Option<f64>| v.filter(|x| x.is_finite()).unwrap_or(0.0);
        let area_distribution: Vec<f64> = data
            .features
            .iter()
            .map(|f| number(f.property_f64("area")))
            .collect();
        let height_distribution: Vec<f64> = data
            .features
            .iter()
            .map(|f| number(f.property_f64("height")))
            .collect();

        let mut function_distribution = BTreeMap::new();
        for feature in &data.features {
            let function = match feature.property("function") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "Unknown".to_string(),
            };
            *function_distribution.entry(function).or_insert(0) += 1;
        }

        let total_buildings = data.len();
        Self {
            total_buildings,
            total_area: area_distribution.iter().sum(),
            avg_height: height_distribution.iter().sum::<f64>() / total_buildings as f64,
            function_distribution,
            area_distribution,
            height_distribution,
        }
    }
}
