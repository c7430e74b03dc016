use std::path::Path;

use log::info;
use tract_onnx::prelude::*;

use crate::error::InferenceError;
use crate::models::{FeatureRecord, FeatureValue, Prediction};

/// Anything that turns one feature record into one class label.
///
/// Implementations are shared read-only across all workers.
pub trait Classifier: Send + Sync {
    fn predict(&self, record: &FeatureRecord) -> Result<Prediction, InferenceError>;
}

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

struct InputBinding {
    field: &'static str,
    datum_type: DatumType,
}

/// ONNX classifier loaded once at startup.
///
/// The model is expected to take one `[1, 1]` input per feature column, named
/// after the column (the layout sklearn pipelines get when converted from a
/// DataFrame), and to emit the class label as its first output.
pub struct ModelHandle {
    plan: Plan,
    inputs: Vec<InputBinding>,
}

impl ModelHandle {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, InferenceError> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(InferenceError::ArtifactNotFound(path.to_path_buf()));
        }

        let load_err = |e: TractError| InferenceError::ModelLoad {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        };

        let mut model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;

        let names = model
            .input_outlets()
            .map_err(load_err)?
            .iter()
            .map(|outlet| model.node(outlet.node).name.clone())
            .collect::<Vec<_>>();
        let fields = resolve_inputs(&names)?;

        let mut inputs = Vec::with_capacity(fields.len());
        for (ix, field) in fields.into_iter().enumerate() {
            let datum_type = model
                .input_fact(ix)
                .map_err(load_err)?
                .datum_type()
                .unwrap_or_else(|| default_datum_type(field));
            model
                .set_input_fact(ix, InferenceFact::dt_shape(datum_type, tvec!(1, 1)))
                .map_err(load_err)?;
            inputs.push(InputBinding { field, datum_type });
        }

        let plan = model
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        info!(
            "Model loaded from {} with inputs {:?}",
            path.display(),
            inputs.iter().map(|i| i.field).collect::<Vec<_>>()
        );
        Ok(Self { plan, inputs })
    }

    /// Input column names in the order the model declares them.
    pub fn input_names(&self) -> Vec<&'static str> {
        self.inputs.iter().map(|binding| binding.field).collect()
    }
}

impl Classifier for ModelHandle {
    fn predict(&self, record: &FeatureRecord) -> Result<Prediction, InferenceError> {
        let run_err = |e: TractError| InferenceError::Run(format!("{e:#}"));

        let inputs = self
            .inputs
            .iter()
            .map(|binding| {
                let value = record.get(binding.field).ok_or_else(|| {
                    InferenceError::Run(format!("no feature named {}", binding.field))
                })?;
                let tensor = match value {
                    FeatureValue::Int(v) => tensor2(&[[v]]),
                    FeatureValue::Float(v) => tensor2(&[[v]]),
                };
                let tensor = tensor
                    .cast_to_dt(binding.datum_type)
                    .map_err(run_err)?
                    .into_owned();
                Ok(tensor.into())
            })
            .collect::<Result<TVec<TValue>, InferenceError>>()?;

        let outputs = self.plan.run(inputs).map_err(run_err)?;
        let labels = outputs
            .first()
            .ok_or(InferenceError::EmptyOutput)?
            .cast_to::<i64>()
            .map_err(run_err)?;
        let label = labels
            .as_slice::<i64>()
            .map_err(run_err)?
            .first()
            .copied()
            .ok_or(InferenceError::EmptyOutput)?;

        Ok(Prediction { label })
    }
}

/// Match model input names to feature columns. Every column must be consumed
/// exactly once and nothing else may be asked for.
fn resolve_inputs(names: &[String]) -> Result<Vec<&'static str>, InferenceError> {
    let mismatch = || InferenceError::InputMismatch {
        expected: FeatureRecord::FIELDS.iter().map(|f| f.to_string()).collect(),
        found: names.to_vec(),
    };

    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let field = FeatureRecord::FIELDS
            .iter()
            .copied()
            .find(|f| *f == name.as_str())
            .ok_or_else(mismatch)?;
        if fields.contains(&field) {
            return Err(mismatch());
        }
        fields.push(field);
    }

    if fields.len() != FeatureRecord::FIELDS.len() {
        return Err(mismatch());
    }
    Ok(fields)
}

fn default_datum_type(field: &str) -> DatumType {
    match field {
        "age" => i64::datum_type(),
        _ => f32::datum_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn inputs_resolve_in_model_order() {
        let fields = resolve_inputs(&names(&["income", "age", "score"])).unwrap();
        assert_eq!(fields, vec!["income", "age", "score"]);
    }

    #[test]
    fn unknown_input_is_rejected() {
        let err = resolve_inputs(&names(&["age", "score", "salary"])).unwrap_err();
        match err {
            InferenceError::InputMismatch { expected, found } => {
                assert_eq!(expected, vec!["age", "score", "income"]);
                assert_eq!(found, vec!["age", "score", "salary"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn positional_single_input_is_rejected() {
        assert!(matches!(
            resolve_inputs(&names(&["float_input"])),
            Err(InferenceError::InputMismatch { .. })
        ));
    }

    #[test]
    fn missing_and_duplicate_inputs_are_rejected() {
        assert!(resolve_inputs(&names(&["age", "score"])).is_err());
        assert!(resolve_inputs(&names(&["age", "age", "score"])).is_err());
    }

    #[test]
    fn age_defaults_to_integer_input() {
        assert_eq!(default_datum_type("age"), i64::datum_type());
        assert_eq!(default_datum_type("income"), f32::datum_type());
    }

    #[test]
    fn load_missing_artifact_fails() {
        let err = ModelHandle::load("does/not/exist.onnx").err().unwrap();
        assert!(matches!(err, InferenceError::ArtifactNotFound(_)));
    }

    #[test]
    fn load_corrupt_artifact_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a protobuf model").unwrap();

        let err = ModelHandle::load(file.path()).err().unwrap();
        assert!(
            matches!(
                err,
                InferenceError::ModelLoad { .. } | InferenceError::InputMismatch { .. }
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn load_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ModelHandle::load(dir.path()).err().unwrap();
        assert!(matches!(err, InferenceError::ArtifactNotFound(_)));
    }

    mod fixture {
        use prost::Message;
        use tract_onnx::pb::tensor_proto::DataType;
        use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};
        use tract_onnx::pb::*;

        fn column(name: &str, elem: DataType) -> ValueInfoProto {
            let dim = |value| Dimension {
                denotation: String::new(),
                value: Some(value),
            };
            ValueInfoProto {
                name: name.into(),
                r#type: Some(TypeProto {
                    denotation: String::new(),
                    value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                        elem_type: elem as i32,
                        shape: Some(TensorShapeProto {
                            dim: vec![
                                dim(dimension::Value::DimParam("N".into())),
                                dim(dimension::Value::DimValue(1)),
                            ],
                        }),
                    })),
                }),
                ..Default::default()
            }
        }

        fn node(op: &str, inputs: &[&str], output: &str, cast_to: Option<DataType>) -> NodeProto {
            let attribute = cast_to
                .map(|dt| {
                    vec![AttributeProto {
                        name: "to".into(),
                        r#type: attribute_proto::AttributeType::Int as i32,
                        i: dt as i64,
                        ..Default::default()
                    }]
                })
                .unwrap_or_default();
            NodeProto {
                op_type: op.into(),
                input: inputs.iter().map(|s| s.to_string()).collect(),
                output: vec![output.into()],
                name: output.into(),
                attribute,
                ..Default::default()
            }
        }

        /// `label = int64(float(age) + score > income)`, with the inputs
        /// declared as income, age, score so binding has to go by name.
        pub fn threshold_model() -> Vec<u8> {
            let graph = GraphProto {
                name: "threshold".into(),
                input: vec![
                    column("income", DataType::Float),
                    column("age", DataType::Int64),
                    column("score", DataType::Float),
                ],
                output: vec![column("label", DataType::Int64)],
                node: vec![
                    node("Cast", &["age"], "age_f", Some(DataType::Float)),
                    node("Add", &["age_f", "score"], "total", None),
                    node("Greater", &["total", "income"], "above", None),
                    node("Cast", &["above"], "label", Some(DataType::Int64)),
                ],
                ..Default::default()
            };
            ModelProto {
                ir_version: 8,
                opset_import: vec![OperatorSetIdProto {
                    domain: String::new(),
                    version: 13,
                }],
                graph: Some(graph),
                ..Default::default()
            }
            .encode_to_vec()
        }
    }

    fn load_threshold_model() -> (ModelHandle, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&fixture::threshold_model()).unwrap();
        let model = ModelHandle::load(file.path()).unwrap();
        (model, file)
    }

    #[test]
    fn onnx_inputs_keep_declared_order() {
        let (model, _file) = load_threshold_model();
        assert_eq!(model.input_names(), vec!["income", "age", "score"]);
    }

    #[test]
    fn onnx_model_binds_features_by_name() {
        let (model, _file) = load_threshold_model();
        let cases = [
            ((35, 0.72, 30.0), 1),
            ((35, 0.72, 45000.0), 0),
            ((10, 0.5, 10.4), 1),
        ];
        for ((age, score, income), expected) in cases {
            let record = FeatureRecord { age, score, income };
            let prediction = model.predict(&record).unwrap();
            assert_eq!(prediction.label, expected, "{record:?}");
        }
    }

    #[test]
    fn onnx_model_is_deterministic() {
        let (model, _file) = load_threshold_model();
        let record = FeatureRecord {
            age: 35,
            score: 0.72,
            income: 45000.0,
        };
        assert_eq!(model.predict(&record).unwrap(), model.predict(&record).unwrap());
    }

    fn model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("models")
            .join("uk_decision_model.onnx")
    }

    #[test]
    #[ignore = "needs models/uk_decision_model.onnx"]
    fn real_model_is_deterministic() {
        let model = ModelHandle::load(model_path()).unwrap();
        let record = FeatureRecord {
            age: 35,
            score: 0.72,
            income: 45000.0,
        };
        let first = model.predict(&record).unwrap();
        let second = model.predict(&record).unwrap();
        assert_eq!(first, second);
    }
}
