use crate::model::{Metrics, DEVICE_ID_MAX_LEN};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const TEMP_MIN: f64 = -20.0;
const TEMP_MAX: f64 = 80.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;

/// Metrics with a fixed inclusive range. Any other name only has to be a
/// finite number.
const KNOWN_METRICS: &[(&str, f64, f64)] = &[
    ("temp_c", TEMP_MIN, TEMP_MAX),
    ("humidity_pct", HUMIDITY_MIN, HUMIDITY_MAX),
];

/// Location of a rejected input inside the ingest body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    DeviceId,
    Metrics,
    Metric(String),
}

impl Field {
    /// Path segments as reported in a 422 body, e.g. `["body", "metrics", "temp_c"]`.
    pub fn loc(&self) -> Vec<String> {
        let mut loc = vec!["body".to_string()];
        match self {
            Field::DeviceId => loc.push("device_id".to_string()),
            Field::Metrics => loc.push("metrics".to_string()),
            Field::Metric(key) => {
                loc.push("metrics".to_string());
                loc.push(key.clone());
            }
        }
        loc
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::DeviceId => write!(f, "device_id"),
            Field::Metrics => write!(f, "metrics"),
            Field::Metric(key) => write!(f, "metrics.{}", key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationRule {
    Shape,
    NonNumeric,
    NonFinite,
    OutOfRange { min: f64, max: f64 },
}

impl ValidationRule {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationRule::Shape => "shape",
            ValidationRule::NonNumeric => "non_numeric",
            ValidationRule::NonFinite => "non_finite",
            ValidationRule::OutOfRange { .. } => "out_of_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub rule: ValidationRule,
    pub message: String,
}

impl ValidationError {
    fn new(field: Field, rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            field,
            rule,
            message: message.into(),
        }
    }
}

/// Validates an ingest payload and returns its metrics as finite `f64`s.
pub fn validate(
    device_id: &str,
    metrics: &BTreeMap<String, Value>,
) -> Result<Metrics, ValidationError> {
    validate_device_id(device_id)?;
    validate_metrics(metrics)
}

pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    let len = device_id.chars().count();
    if len == 0 || len > DEVICE_ID_MAX_LEN {
        return Err(ValidationError::new(
            Field::DeviceId,
            ValidationRule::Shape,
            format!(
                "device_id must be between 1 and {} characters",
                DEVICE_ID_MAX_LEN
            ),
        ));
    }
    Ok(())
}

/// Checks run as whole passes in this order, so the first failing rule is
/// reported even if a later key breaks an earlier rule.
pub fn validate_metrics(metrics: &BTreeMap<String, Value>) -> Result<Metrics, ValidationError> {
    if metrics.is_empty() {
        return Err(ValidationError::new(
            Field::Metrics,
            ValidationRule::Shape,
            "metrics must contain at least one key/value pair",
        ));
    }

    if let Some(key) = metrics.keys().find(|k| k.trim().is_empty()) {
        return Err(ValidationError::new(
            Field::Metric(key.clone()),
            ValidationRule::Shape,
            "metrics keys must be non-empty strings",
        ));
    }

    let mut normalized = Metrics::new();
    for (key, value) in metrics {
        let number = coerce_number(value).ok_or_else(|| {
            ValidationError::new(
                Field::Metric(key.clone()),
                ValidationRule::NonNumeric,
                format!("value {} is not a number", value),
            )
        })?;
        normalized.insert(key.clone(), number);
    }

    if let Some((key, value)) = normalized.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ValidationError::new(
            Field::Metric(key.clone()),
            ValidationRule::NonFinite,
            format!("value {} is not finite", value),
        ));
    }

    for (key, &value) in &normalized {
        if let Some((min, max)) = known_range(key) {
            if value < min || value > max {
                return Err(ValidationError::new(
                    Field::Metric(key.clone()),
                    ValidationRule::OutOfRange { min, max },
                    format!("{} {} out of range [{}, {}]", key, value, min, max),
                ));
            }
        }
    }

    Ok(normalized)
}

/// Inclusive range for a known metric name.
pub fn known_range(name: &str) -> Option<(f64, f64)> {
    KNOWN_METRICS
        .iter()
        .find(|(known, _, _)| *known == name)
        .map(|&(_, min, max)| (min, max))
}

/// JSON numbers, booleans (as 1.0/0.0) and number-like strings become `f64`;
/// everything else is rejected. Strings such as `"NaN"` parse here and fail
/// the finite check.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
