//! Declarative per-pipeline settings: constraint + default + metadata, with
//! typed validate/normalize operations.
//!
//! Grounded on `settings_api.py`'s `ConstraintType`/`Constraint` subclasses
//! (`RangeConstraint`, `ListOptionsConstraint`, ...), generalized from an
//! ABC-per-variant hierarchy into a closed enum per the tagged-union
//! REDESIGN FLAG in spec §9.

use serde::{Deserialize, Serialize};
use telemetry_types::Value;
use thiserror::Error;

/// Outcome of validating a candidate value against a [`Constraint`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error_message: Option<String>,
    pub normalized_value: Option<Value>,
}

impl ValidationResult {
    fn ok(normalized: Value) -> Self {
        Self {
            valid: true,
            error_message: None,
            normalized_value: Some(normalized),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_message: Some(message.into()),
            normalized_value: None,
        }
    }
}

/// The closed set of settings constraint kinds (spec §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Range {
        min: f64,
        max: Option<f64>,
        step: Option<f64>,
    },
    Enumerated {
        options: Vec<String>,
        allow_multiple: bool,
    },
    Boolean,
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Color {
        format: ColorFormat,
    },
    List {
        inner: Option<Box<Constraint>>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    Hex,
    Rgb,
    Rgba,
    Hsl,
}

impl Constraint {
    /// Validate `value`, returning the normalized value on success.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        match self {
            Constraint::Range { min, max, step } => validate_range(*min, *max, *step, value),
            Constraint::Enumerated {
                options,
                allow_multiple,
            } => validate_enumerated(options, *allow_multiple, value),
            Constraint::Boolean => validate_boolean(value),
            Constraint::String {
                min_length,
                max_length,
                pattern,
            } => validate_string(*min_length, *max_length, pattern.as_deref(), value),
            Constraint::Color { format } => validate_color(*format, value),
            Constraint::List {
                inner,
                min_length,
                max_length,
            } => validate_list(inner.as_deref(), *min_length, *max_length, value),
        }
    }
}

fn validate_range(min: f64, max: Option<f64>, step: Option<f64>, value: &Value) -> ValidationResult {
    let Some(num) = value.as_f64() else {
        return ValidationResult::err(format!("value {value:?} is not a valid number"));
    };
    if num < min || max.is_some_and(|m| num > m) {
        return ValidationResult::err(format!(
            "value {num} is outside range [{min}, {}]",
            max.map(|m| m.to_string()).unwrap_or_else(|| "inf".into())
        ));
    }
    let normalized = match step {
        Some(step) if step > 0.0 => {
            let steps = ((num - min) / step).round();
            min + steps * step
        }
        _ => num,
    };
    ValidationResult::ok(Value::Float(normalized))
}

fn validate_enumerated(options: &[String], allow_multiple: bool, value: &Value) -> ValidationResult {
    if allow_multiple {
        let Value::StringArray(items) = value else {
            return ValidationResult::err("value must be a list when multiple selection is allowed");
        };
        let invalid: Vec<&String> = items.iter().filter(|i| !options.contains(i)).collect();
        if !invalid.is_empty() {
            return ValidationResult::err(format!("invalid options: {invalid:?}"));
        }
        ValidationResult::ok(value.clone())
    } else {
        let Some(s) = value.as_str() else {
            return ValidationResult::err("value must be a string");
        };
        if !options.iter().any(|o| o == s) {
            return ValidationResult::err(format!("{s} is not one of {options:?}"));
        }
        ValidationResult::ok(value.clone())
    }
}

fn validate_boolean(value: &Value) -> ValidationResult {
    match value.as_bool() {
        Some(b) => ValidationResult::ok(Value::Bool(b)),
        None => ValidationResult::err(format!("{value:?} is not a recognized boolean")),
    }
}

fn validate_string(
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<&str>,
    value: &Value,
) -> ValidationResult {
    let Some(s) = value.as_str() else {
        return ValidationResult::err("value must be a string");
    };
    if min_length.is_some_and(|min| s.len() < min) {
        return ValidationResult::err(format!("value shorter than minimum length {min_length:?}"));
    }
    if max_length.is_some_and(|max| s.len() > max) {
        return ValidationResult::err(format!("value longer than maximum length {max_length:?}"));
    }
    if let Some(pattern) = pattern {
        match regex::Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => {
                return ValidationResult::err(format!("value does not match pattern {pattern}"));
            }
            Err(e) => return ValidationResult::err(format!("invalid pattern {pattern}: {e}")),
            _ => {}
        }
    }
    ValidationResult::ok(value.clone())
}

fn validate_color(format: ColorFormat, value: &Value) -> ValidationResult {
    let Some(s) = value.as_str() else {
        return ValidationResult::err("value must be a string");
    };
    match format {
        ColorFormat::Hex => {
            let hex = s.strip_prefix('#').unwrap_or(s);
            if (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                ValidationResult::ok(Value::String(format!("#{}", hex.to_ascii_uppercase())))
            } else {
                ValidationResult::err(format!("{s} is not a valid hex color"))
            }
        }
        ColorFormat::Rgb => {
            if is_functional_color(s, "rgb", 3) {
                ValidationResult::ok(value.clone())
            } else {
                ValidationResult::err(format!("{s} is not a valid rgb(...) color"))
            }
        }
        ColorFormat::Rgba => {
            if is_functional_color(s, "rgba", 4) {
                ValidationResult::ok(value.clone())
            } else {
                ValidationResult::err(format!("{s} is not a valid rgba(...) color"))
            }
        }
        ColorFormat::Hsl => {
            if is_functional_color(s, "hsl", 3) {
                ValidationResult::ok(value.clone())
            } else {
                ValidationResult::err(format!("{s} is not a valid hsl(...) color"))
            }
        }
    }
}

fn is_functional_color(s: &str, prefix: &str, arity: usize) -> bool {
    let Some(rest) = s.strip_prefix(prefix).and_then(|r| r.strip_prefix('(')) else {
        return false;
    };
    let Some(inner) = rest.strip_suffix(')') else {
        return false;
    };
    inner.split(',').map(|p| p.trim()).count() == arity
        && inner.split(',').all(|p| !p.trim().is_empty())
}

fn validate_list(
    inner: Option<&Constraint>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    value: &Value,
) -> ValidationResult {
    let items: Vec<Value> = match value {
        Value::IntArray(v) => v.iter().map(|i| Value::Int(*i)).collect(),
        Value::FloatArray(v) => v.iter().map(|f| Value::Float(*f)).collect(),
        Value::BoolArray(v) => v.iter().map(|b| Value::Bool(*b)).collect(),
        Value::StringArray(v) => v.iter().map(|s| Value::String(s.clone())).collect(),
        _ => return ValidationResult::err("value must be a list"),
    };
    if min_length.is_some_and(|min| items.len() < min) {
        return ValidationResult::err(format!("list shorter than minimum length {min_length:?}"));
    }
    if max_length.is_some_and(|max| items.len() > max) {
        return ValidationResult::err(format!("list longer than maximum length {max_length:?}"));
    }
    let Some(inner) = inner else {
        return ValidationResult::ok(value.clone());
    };
    let mut normalized = Vec::with_capacity(items.len());
    for item in &items {
        let result = inner.validate(item);
        if !result.valid {
            return ValidationResult::err(
                result
                    .error_message
                    .unwrap_or_else(|| "invalid list element".into()),
            );
        }
        normalized.push(result.normalized_value.unwrap());
    }
    ValidationResult::ok(reassemble_list(value, normalized))
}

fn reassemble_list(original: &Value, normalized: Vec<Value>) -> Value {
    match original {
        Value::IntArray(_) => Value::IntArray(normalized.iter().filter_map(|v| v.as_int()).collect()),
        Value::FloatArray(_) => {
            Value::FloatArray(normalized.iter().filter_map(|v| v.as_f64()).collect())
        }
        Value::BoolArray(_) => {
            Value::BoolArray(normalized.iter().filter_map(|v| v.as_bool()).collect())
        }
        Value::StringArray(_) => Value::StringArray(
            normalized
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A single named, constrained, defaulted settings field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub constraint: Constraint,
    pub default: Value,
    pub description: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("unknown setting `{key}`")]
    UnknownSetting { key: String },
    #[error("invalid value for setting `{key}`: {message}")]
    InvalidSetting { key: String, message: String },
}

/// A typed, per-pipeline settings object composed of named [`Setting`] fields.
///
/// Every value stored is the normalized result of the constraint's
/// validator; no un-validated write is ever persisted (spec §4.1).
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    schema: Vec<Setting>,
    values: Vec<(String, Value)>,
}

impl PipelineSettings {
    pub fn from_schema(schema: Vec<Setting>) -> Self {
        let values = schema.iter().map(|s| (s.key.clone(), s.default.clone())).collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &[Setting] {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Validate and, on success, store `value` for `name`. On failure the
    /// prior value is left intact and the error is returned (spec §4.1).
    pub fn set(&mut self, name: &str, value: Value) -> Result<Value, SettingsError> {
        let constraint = self
            .schema
            .iter()
            .find(|s| s.key == name)
            .map(|s| s.constraint.clone())
            .ok_or_else(|| SettingsError::UnknownSetting { key: name.to_string() })?;

        let result = constraint.validate(&value);
        if !result.valid {
            return Err(SettingsError::InvalidSetting {
                key: name.to_string(),
                message: result.error_message.unwrap_or_default(),
            });
        }
        let normalized = result.normalized_value.unwrap_or(value);
        if let Some(slot) = self.values.iter_mut().find(|(k, _)| k == name) {
            slot.1 = normalized.clone();
        }
        Ok(normalized)
    }

    pub fn to_dict(&self) -> Vec<(String, Value)> {
        self.values.clone()
    }

    pub fn from_dict(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in values {
            let _ = self.set(&key, value);
        }
    }
}
