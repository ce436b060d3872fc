use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;
use tract_onnx::prelude::*;

use crate::features::{FeatureVector, FEATURE_COLUMNS};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("model run failed: {0}")]
    Runtime(String),
    #[error("model produced a non-finite prediction")]
    NonFinite,
}

/// Sidecar written next to the exported graph. Without one the graph is
/// assumed to take the reconciler's own column order.
#[derive(Deserialize)]
struct ModelMeta {
    #[serde(alias = "feat_list")]
    feature_names: Vec<String>,
}

fn read_feature_names(meta_path: &Path) -> Result<Vec<String>> {
    let meta_txt = fs::read_to_string(meta_path)
        .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
    let meta: ModelMeta = serde_json::from_str(&meta_txt)
        .with_context(|| format!("failed to parse {}", meta_path.display()))?;
    Ok(meta.feature_names)
}

type Plan = TypedRunnableModel<TypedModel>;

/// A regressor exported to ONNX, optimized into a runnable plan for a single
/// `[1, n]` float row. The output's first element is the prediction.
pub struct Model {
    feature_names: Vec<String>,
    plan: Plan,
}

impl Model {
    pub fn load(model_path: &Path, meta_path: Option<&Path>) -> Result<Self> {
        let feature_names = match meta_path {
            Some(meta_path) => read_feature_names(meta_path)?,
            None => FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        };

        let graph = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;
        Self::build(graph, feature_names)
    }

    /// Builds from an already decoded ONNX protobuf.
    pub fn from_proto(
        proto: &tract_onnx::pb::ModelProto,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let graph = tract_onnx::onnx()
            .model_for_proto_model(proto)
            .context("failed to import ONNX graph")?;
        Self::build(graph, feature_names)
    }

    fn build(graph: InferenceModel, feature_names: Vec<String>) -> Result<Self> {
        ensure!(!feature_names.is_empty(), "model declares no input features");
        let n = feature_names.len();
        let plan = graph
            .with_input_fact(0, f32::fact([1, n]).into())
            .context("model input does not accept a [1, n] float row")?
            .into_optimized()
            .context("failed to optimize model")?
            .into_runnable()
            .context("failed to build runnable plan")?;

        let model = Self { feature_names, plan };
        // Dummy forward so a broken graph fails at startup, not on the first request
        model
            .predict(&FeatureVector::zeros())
            .context("warmup prediction failed")?;
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Scores one reconciled vector, projected onto this model's column order.
    pub fn predict(&self, x: &FeatureVector) -> Result<f64, InferenceError> {
        let row: Vec<f32> = x
            .ordered(&self.feature_names)
            .into_iter()
            .map(|v| v as f32)
            .collect();
        let input = Tensor::from_shape::<f32>(&[1, row.len()], &row).map_err(runtime)?;
        let outputs = self.plan.run(tvec!(input.into())).map_err(runtime)?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Runtime("model returned no outputs".into()))?;
        let values = output.cast_to::<f64>().map_err(runtime)?;
        let y = *values
            .as_slice::<f64>()
            .map_err(runtime)?
            .first()
            .ok_or_else(|| InferenceError::Runtime("model returned an empty tensor".into()))?;
        if !y.is_finite() {
            return Err(InferenceError::NonFinite);
        }
        Ok(y)
    }
}

fn runtime(e: TractError) -> InferenceError {
    InferenceError::Runtime(format!("{:#}", e))
}

// ---------- Process-wide handle ----------

enum ModelState {
    Ready(Model),
    Unavailable(String),
}

/// The model as held by the server for its whole lifetime. Loading never
/// fails the process; an unusable artifact turns every prediction into
/// [`InferenceError::ModelUnavailable`].
pub struct Predictor {
    state: ModelState,
}

impl Predictor {
    pub fn load(model_path: impl AsRef<Path>, meta_path: Option<&Path>) -> Self {
        let model_path = model_path.as_ref();
        match Model::load(model_path, meta_path) {
            Ok(model) => {
                tracing::info!(
                    "loaded model {}; feature_names[{}]: {:?}",
                    model_path.display(),
                    model.feature_names().len(),
                    model.feature_names()
                );
                Self::ready(model)
            }
            Err(e) => {
                tracing::warn!("model unavailable, predictions will fail: {:#}", e);
                Self::unavailable(format!("{:#}", e))
            }
        }
    }

    pub fn ready(model: Model) -> Self {
        Self {
            state: ModelState::Ready(model),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: ModelState::Unavailable(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }

    pub fn predict(&self, x: &FeatureVector) -> Result<f64, InferenceError> {
        match &self.state {
            ModelState::Ready(model) => model.predict(x),
            ModelState::Unavailable(reason) => Err(InferenceError::ModelUnavailable(reason.clone())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::PredictionRequest;
    use std::io::Write;
    use tract_onnx::pb;
    use tract_onnx::pb::{tensor_shape_proto, type_proto};

    const FLOAT: i32 = 1;

    fn float_info(name: &str, shape: &[i64]) -> pb::ValueInfoProto {
        let dim = shape
            .iter()
            .map(|&d| tensor_shape_proto::Dimension {
                value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                ..Default::default()
            })
            .collect();
        pb::ValueInfoProto {
            name: name.to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: FLOAT,
                    shape: Some(pb::TensorShapeProto { dim }),
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn float_tensor(name: &str, dims: &[i64], values: &[f32]) -> pb::TensorProto {
        pb::TensorProto {
            name: name.to_string(),
            dims: dims.to_vec(),
            data_type: FLOAT,
            float_data: values.to_vec(),
            ..Default::default()
        }
    }

    fn node(op_type: &str, input: &[&str], output: &str) -> pb::NodeProto {
        pb::NodeProto {
            name: output.to_string(),
            op_type: op_type.to_string(),
            input: input.iter().map(|s| s.to_string()).collect(),
            output: vec![output.to_string()],
            ..Default::default()
        }
    }

    /// `variable = float_input · coefficients + intercept`, the graph a linear
    /// regressor exports to.
    pub(crate) fn linear_proto(coefficients: &[f32], intercept: f32) -> pb::ModelProto {
        let n = coefficients.len() as i64;
        let graph = pb::GraphProto {
            name: "linear_regressor".to_string(),
            node: vec![
                node("MatMul", &["float_input", "coef"], "mm"),
                node("Add", &["mm", "intercept"], "variable"),
            ],
            initializer: vec![
                float_tensor("coef", &[n, 1], coefficients),
                float_tensor("intercept", &[1], &[intercept]),
            ],
            input: vec![float_info("float_input", &[1, n])],
            output: vec![float_info("variable", &[1, 1])],
            ..Default::default()
        };
        pb::ModelProto {
            ir_version: 7,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(graph),
            ..Default::default()
        }
    }

    pub(crate) fn names() -> Vec<String> {
        FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect()
    }

    /// Linear model over the full reconciled vector, one coefficient per column.
    pub(crate) fn linear_model(coefficients: &[f32], intercept: f32) -> Model {
        Model::from_proto(&linear_proto(coefficients, intercept), names()).unwrap()
    }

    fn sample(category: &str) -> FeatureVector {
        FeatureVector::from_request(&PredictionRequest {
            longitude: -118.24,
            latitude: 34.12,
            housing_median_age: 30.0,
            total_rooms: 1000.0,
            total_bedrooms: 200.0,
            population: 5000.0,
            households: 1500.0,
            median_income: 3.5,
            ocean_proximity: category.to_string(),
        })
    }

    #[test]
    fn linear_model_scores_reconciled_vector() {
        let mut coef = vec![0.0; 13];
        coef[7] = 40_000.0; // median_income
        coef[9] = -50_000.0; // INLAND
        let model = linear_model(&coef, 100_000.0);
        assert_eq!(model.predict(&sample("<1H OCEAN")).unwrap(), 240_000.0);
        assert_eq!(model.predict(&sample("INLAND")).unwrap(), 190_000.0);
        assert_eq!(model.predict(&sample("DESERT")).unwrap(), 240_000.0);
    }

    #[test]
    fn model_uses_its_own_column_order() {
        let model = Model::from_proto(
            &linear_proto(&[1.0, 0.0], 0.0),
            vec!["median_income".into(), "longitude".into()],
        )
        .unwrap();
        assert_eq!(model.feature_names(), ["median_income", "longitude"]);
        assert_eq!(model.predict(&sample("ISLAND")).unwrap(), 3.5);
    }

    #[test]
    fn unknown_model_columns_read_as_zero() {
        let model = Model::from_proto(
            &linear_proto(&[1000.0, 2.0], 7.0),
            vec!["sqft_living".into(), "median_income".into()],
        )
        .unwrap();
        assert_eq!(model.predict(&sample("INLAND")).unwrap(), 14.0);
    }

    #[test]
    fn rejects_graph_of_the_wrong_width() {
        // 13 declared features against a graph expecting 3 inputs
        let result = Model::from_proto(&linear_proto(&[1.0; 3], 0.0), names());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_feature_list() {
        let err = Model::from_proto(&linear_proto(&[1.0], 0.0), vec![])
            .err()
            .unwrap();
        assert!(err.to_string().contains("no input features"));
    }

    #[test]
    fn non_finite_output_is_an_inference_error() {
        let model =
            Model::from_proto(&linear_proto(&[f32::MAX], 0.0), vec!["population".into()]).unwrap();
        let err = model.predict(&sample("INLAND")).unwrap_err();
        assert!(matches!(err, InferenceError::NonFinite));
    }

    #[test]
    fn meta_file_supplies_column_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"feat_list": ["median_income", "households"], "in_dim": 2}"#)
            .unwrap();
        let names = read_feature_names(file.path()).unwrap();
        assert_eq!(names, ["median_income", "households"]);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"feature_names": ["population"]}"#).unwrap();
        assert_eq!(read_feature_names(file.path()).unwrap(), ["population"]);
    }

    #[test]
    fn missing_artifact_yields_unavailable_predictor() {
        let predictor = Predictor::load("/nonexistent/model.onnx", None);
        assert!(!predictor.is_available());
        let err = predictor.predict(&sample("INLAND")).unwrap_err();
        assert!(matches!(err, InferenceError::ModelUnavailable(_)));
        assert!(err.to_string().starts_with("model unavailable"));
    }

    #[test]
    fn malformed_artifact_yields_unavailable_predictor() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xff\xfe definitely not protobuf").unwrap();
        let predictor = Predictor::load(file.path(), None);
        assert!(!predictor.is_available());
    }

    #[test]
    fn unreadable_meta_yields_unavailable_predictor() {
        let mut meta = tempfile::NamedTempFile::new().unwrap();
        meta.write_all(b"{ not json").unwrap();
        let predictor = Predictor::load("/nonexistent/model.onnx", Some(meta.path()));
        assert!(!predictor.is_available());
        let err = predictor.predict(&sample("INLAND")).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn ready_predictor_scores() {
        let mut coef = vec![0.0; 13];
        coef[12] = 25_000.0; // NEAR OCEAN
        let predictor = Predictor::ready(linear_model(&coef, 1.0));
        assert!(predictor.is_available());
        assert_eq!(predictor.predict(&sample("NEAR OCEAN")).unwrap(), 25_001.0);
    }
}
