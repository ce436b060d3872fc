use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

// ---------- Inbound ----------

/// The nine census fields a caller supplies for one prediction.
///
/// Deserialization is the validation step: a payload that does not produce a
/// `PredictionRequest` never reaches the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(deserialize_with = "float_field")]
    pub longitude: f64,
    #[serde(deserialize_with = "float_field")]
    pub latitude: f64,
    #[serde(deserialize_with = "float_field")]
    pub housing_median_age: f64,
    #[serde(deserialize_with = "float_field")]
    pub total_rooms: f64,
    #[serde(deserialize_with = "float_field")]
    pub total_bedrooms: f64,
    #[serde(deserialize_with = "float_field")]
    pub population: f64,
    #[serde(deserialize_with = "float_field")]
    pub households: f64,
    #[serde(deserialize_with = "float_field")]
    pub median_income: f64,
    pub ocean_proximity: String,
}

/// Accepts a JSON number, or a string holding one (HTML forms submit
/// everything as text). The result must be finite.
fn float_field<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)
        .map_err(|_| de::Error::custom("value is not a valid float"))?
    {
        Raw::Number(v) => v,
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("value is not a valid float: {:?}", s)))?,
    };

    if !value.is_finite() {
        return Err(de::Error::custom("value must be a finite number"));
    }
    Ok(value)
}

// ---------- Persisted ----------

/// One stored prediction: the caller's inputs, the model output and the
/// insert-time metadata. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub inputs: PredictionRequest,
    pub predicted_house_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
