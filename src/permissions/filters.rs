use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// Subscription filter operators, a subset of the find API operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
    #[serde(rename = "$exists")] Exists,
}

impl FilterOp {
    fn parse(s: &str) -> Option<FilterOp> {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data for {field}: {message}")]
    InvalidOperatorData { field: String, message: String },
}

/// Check that every predicate in `filters` is well formed
pub fn validate(filters: &Map<String, Value>) -> Result<(), FilterError> {
    for (field, predicate) in filters {
        let Value::Object(ops) = predicate else { continue };
        if !is_operator_object(ops) {
            continue;
        }
        for (key, data) in ops {
            let op = FilterOp::parse(key).ok_or_else(|| FilterError::UnsupportedOperator(key.clone()))?;
            match op {
                FilterOp::In | FilterOp::NIn if !data.is_array() => {
                    return Err(FilterError::InvalidOperatorData {
                        field: field.clone(),
                        message: format!("{} requires an array", key),
                    });
                }
                FilterOp::Exists if !data.is_boolean() => {
                    return Err(FilterError::InvalidOperatorData {
                        field: field.clone(),
                        message: "$exists requires a boolean".to_string(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Evaluate all predicates against `record`; an empty filter map matches everything
pub fn matches(filters: &Map<String, Value>, record: &Map<String, Value>) -> bool {
    filters.iter().all(|(field, predicate)| {
        let value = record.get(field);
        match predicate {
            Value::Object(ops) if is_operator_object(ops) => ops.iter().all(|(key, data)| {
                FilterOp::parse(key).map_or(false, |op| apply(op, value, data))
            }),
            expected => value == Some(expected),
        }
    })
}

fn is_operator_object(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn apply(op: FilterOp, value: Option<&Value>, data: &Value) -> bool {
    match op {
        FilterOp::Eq => value == Some(data),
        FilterOp::Ne => value != Some(data),
        FilterOp::In => data.as_array().map_or(false, |set| value.map_or(false, |v| set.contains(v))),
        FilterOp::NIn => data.as_array().map_or(false, |set| value.map_or(true, |v| !set.contains(v))),
        FilterOp::Exists => {
            let present = value.map_or(false, |v| !v.is_null());
            data.as_bool() == Some(present)
        }
        FilterOp::Gt => compare(value, data) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(value, data), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(value, data) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(value, data), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn compare(value: Option<&Value>, data: &Value) -> Option<Ordering> {
    match (value?, data) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
