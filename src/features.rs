use std::collections::HashMap;

use crate::types::PredictionRequest;

/// Category values the model was trained on, in one-hot column order.
pub const OCEAN_PROXIMITY_CATEGORIES: [&str; 5] =
    ["<1H OCEAN", "INLAND", "ISLAND", "NEAR BAY", "NEAR OCEAN"];

pub const FEATURE_COUNT: usize = 13;

/// Authoritative column order of the model input matrix.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "longitude",
    "latitude",
    "housing_median_age",
    "total_rooms",
    "total_bedrooms",
    "population",
    "households",
    "median_income",
    "ocean_proximity_<1H OCEAN",
    "ocean_proximity_INLAND",
    "ocean_proximity_ISLAND",
    "ocean_proximity_NEAR BAY",
    "ocean_proximity_NEAR OCEAN",
];

const CATEGORY_PREFIX: &str = "ocean_proximity_";

/// Fixed-width model input. Every column of [`FEATURE_COLUMNS`] is always
/// present.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    /// Expand a request into the model's column layout.
    ///
    /// The request is first flattened the way a one-row one-hot encoding
    /// would produce it (numeric columns plus a single
    /// `ocean_proximity_<value>` column), then reindexed against
    /// [`FEATURE_COLUMNS`]. Columns the input did not produce are 0, and a
    /// column it produced that the model does not know is dropped, so an
    /// unrecognized category leaves every indicator at 0.
    pub fn from_request(req: &PredictionRequest) -> Self {
        let flat = flatten(req);
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, name) in values.iter_mut().zip(FEATURE_COLUMNS) {
            *slot = *flat.get(name).unwrap_or(&0.0);
        }
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_COLUMNS
            .iter()
            .position(|c| *c == name)
            .map(|i| self.values[i])
    }

    pub fn columns(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_COLUMNS.iter().copied().zip(self.values.iter().copied())
    }

    /// Project onto an arbitrary column order; unknown names read as 0.
    pub fn ordered(&self, names: &[String]) -> Vec<f64> {
        names
            .iter()
            .map(|n| self.get(n).unwrap_or(0.0))
            .collect()
    }

    /// Number of indicator columns set, 0 or 1.
    pub fn active_categories(&self) -> usize {
        self.values[8..].iter().filter(|v| **v != 0.0).count()
    }
}

fn flatten(req: &PredictionRequest) -> HashMap<String, f64> {
    let mut flat = HashMap::with_capacity(9);
    flat.insert("longitude".to_string(), req.longitude);
    flat.insert("latitude".to_string(), req.latitude);
    flat.insert("housing_median_age".to_string(), req.housing_median_age);
    flat.insert("total_rooms".to_string(), req.total_rooms);
    flat.insert("total_bedrooms".to_string(), req.total_bedrooms);
    flat.insert("population".to_string(), req.population);
    flat.insert("households".to_string(), req.households);
    flat.insert("median_income".to_string(), req.median_income);
    flat.insert(format!("{}{}", CATEGORY_PREFIX, req.ocean_proximity), 1.0);
    flat
}
