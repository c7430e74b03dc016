use serde::Serialize;
use serde_json::{Map, Value};

pub const HEALTH_STATUS: &str = "Backend is running";

/// One row of model input.
///
/// Field names are the column names the model pipeline was fitted on; the
/// model binds values by name, so they must not be renamed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRecord {
    pub age: i64,
    pub score: f64,
    pub income: f64,
}

/// A single feature value, tagged with the numeric kind it was declared as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
}

impl FeatureRecord {
    pub const FIELDS: [&'static str; 3] = ["age", "score", "income"];

    /// Validate a decoded JSON object into a record.
    ///
    /// Every field is checked, so the error list names all offending fields
    /// rather than only the first one. Unknown keys are ignored.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        let age = check(&mut errors, "age", required(fields, "age").and_then(coerce_int));
        let score = check(&mut errors, "score", required(fields, "score").and_then(coerce_float));
        let income = check(&mut errors, "income", required(fields, "income").and_then(coerce_float));

        match (age, score, income) {
            (Some(age), Some(score), Some(income)) => Ok(Self { age, score, income }),
            _ => Err(errors),
        }
    }

    /// Look up a feature by column name.
    pub fn get(&self, field: &str) -> Option<FeatureValue> {
        match field {
            "age" => Some(FeatureValue::Int(self.age)),
            "score" => Some(FeatureValue::Float(self.score)),
            "income" => Some(FeatureValue::Float(self.income)),
            _ => None,
        }
    }
}

fn check<T>(errors: &mut Vec<FieldError>, field: &'static str, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(reason) => {
            errors.push(FieldError { field, reason });
            None
        }
    }
}

fn required<'a>(fields: &'a Map<String, Value>, field: &str) -> Result<&'a Value, String> {
    fields.get(field).ok_or_else(|| "field required".to_string())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn coerce_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                Some(f) if f.fract() == 0.0 => Err(format!("integer {f} is out of range")),
                _ => Err(format!("expected an integer, got fractional number {n}")),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got string {s:?}")),
        other => Err(format!("expected an integer, got {}", kind(other))),
    }
}

fn coerce_float(value: &Value) -> Result<f64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => Some(f),
            Err(_) => return Err(format!("expected a number, got string {s:?}")),
        },
        other => return Err(format!("expected a number, got {}", kind(other))),
    };

    match parsed {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err("expected a finite number".to_string()),
    }
}

/// Class label produced by the model for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub label: i64,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: i64,
}

impl From<Prediction> for PredictionResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            prediction: prediction.label,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn running() -> Self {
        Self {
            status: HEALTH_STATUS,
        }
    }
}

/// Why a single request field was rejected.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<FieldError>>,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorBody {
            error: message.into(),
            detail: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_detail(mut self, detail: Vec<FieldError>) -> Self {
        self.detail = Some(detail);
        self
    }
}
