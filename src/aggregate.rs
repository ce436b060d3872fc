//! Summary views over the full prediction history.
//!
//! Every view is a pure function of the records it is given; the caller loads
//! them fresh from the store on each request.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::types::PredictionRecord;

/// Row cap for the ranked views.
pub const TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    TopHouseValues,
    TopPricesByLocation,
    TopMedianIncome,
    MostPopulatedLocations,
    MaxOceanProximity,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown visualization: {0}")]
pub struct UnknownView(pub String);

impl View {
    pub const ALL: [View; 5] = [
        View::TopHouseValues,
        View::TopPricesByLocation,
        View::TopMedianIncome,
        View::MostPopulatedLocations,
        View::MaxOceanProximity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            View::TopHouseValues => "top_5_house_values",
            View::TopPricesByLocation => "top_prices_by_location",
            View::TopMedianIncome => "top_median_income",
            View::MostPopulatedLocations => "most_populated_locations",
            View::MaxOceanProximity => "max_ocean_proximity",
        }
    }

    pub fn compute(self, records: &[PredictionRecord]) -> ViewRows {
        match self {
            View::TopHouseValues => {
                ViewRows::Records(top_by(records, |r| r.predicted_house_value))
            }
            View::TopPricesByLocation => ViewRows::Locations(max_by_location(records)),
            View::TopMedianIncome => {
                ViewRows::Records(top_by(records, |r| Some(r.inputs.median_income)))
            }
            View::MostPopulatedLocations => {
                ViewRows::Records(top_by(records, |r| Some(r.inputs.population)))
            }
            View::MaxOceanProximity => ViewRows::Categories(max_by_category(records)),
        }
    }
}

impl FromStr for View {
    type Err = UnknownView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| UnknownView(s.to_string()))
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationMax {
    pub longitude: f64,
    pub latitude: f64,
    pub predicted_house_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMax {
    pub ocean_proximity: String,
    pub predicted_house_value: Option<f64>,
}

/// Output of one view. Serializes as a bare JSON array of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewRows {
    Records(Vec<PredictionRecord>),
    Locations(Vec<LocationMax>),
    Categories(Vec<CategoryMax>),
}

impl ViewRows {
    pub fn len(&self) -> usize {
        match self {
            ViewRows::Records(rows) => rows.len(),
            ViewRows::Locations(rows) => rows.len(),
            ViewRows::Categories(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descending, missing values last.
fn descending(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Maximum that skips missing values.
fn max_present(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn top_by<F>(records: &[PredictionRecord], key: F) -> Vec<PredictionRecord>
where
    F: Fn(&PredictionRecord) -> Option<f64>,
{
    let mut ranked: Vec<&PredictionRecord> = records.iter().collect();
    // sort_by is stable, so equal keys keep history order
    ranked.sort_by(|a, b| descending(key(a), key(b)));
    ranked.into_iter().take(TOP_N).cloned().collect()
}

fn max_by_location(records: &[PredictionRecord]) -> Vec<LocationMax> {
    let mut points: Vec<LocationMax> = records
        .iter()
        // `+ 0.0` folds -0.0 into 0.0 so total_cmp and == agree on one pair
        .map(|r| LocationMax {
            longitude: r.inputs.longitude + 0.0,
            latitude: r.inputs.latitude + 0.0,
            predicted_house_value: r.predicted_house_value,
        })
        .collect();
    points.sort_by(|a, b| {
        a.longitude
            .total_cmp(&b.longitude)
            .then(a.latitude.total_cmp(&b.latitude))
    });

    let mut out: Vec<LocationMax> = Vec::new();
    for p in points {
        match out.last_mut() {
            Some(last) if last.longitude == p.longitude && last.latitude == p.latitude => {
                last.predicted_house_value =
                    max_present(last.predicted_house_value, p.predicted_house_value);
            }
            _ => out.push(p),
        }
    }
    out
}

fn max_by_category(records: &[PredictionRecord]) -> Vec<CategoryMax> {
    let mut groups: BTreeMap<&str, Option<f64>> = BTreeMap::new();
    for r in records {
        let slot = groups.entry(r.inputs.ocean_proximity.as_str()).or_insert(None);
        *slot = max_present(*slot, r.predicted_house_value);
    }
    groups
        .into_iter()
        .map(|(category, value)| CategoryMax {
            ocean_proximity: category.to_string(),
            predicted_house_value: value,
        })
        .collect()
}
