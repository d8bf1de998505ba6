//! CEL success and failure conditions.
//!
//! The provider output is bound to `result`:
//! `result.statusCode == 200 && result.body.healthy`.

use std::collections::HashMap;

use cel_interpreter::{Context, Program, Value as CelValue};
use serde_json::Value;

use super::error::VerificationError;
use crate::model::{MeasurementStatus, MetricSpec};

/// Compile-check an expression.
pub fn validate_condition(expression: &str) -> Result<(), VerificationError> {
    Program::compile(expression)
        .map(|_| ())
        .map_err(|e| VerificationError::InvalidCondition {
            expression: expression.to_string(),
            message: e.to_string(),
        })
}

/// Evaluate `expression` against `result`. Non-boolean results are errors.
pub fn evaluate_condition(expression: &str, result: &Value) -> Result<bool, String> {
    let program = Program::compile(expression).map_err(|e| e.to_string())?;
    let mut context = Context::default();
    context.add_variable_from_value("result", to_cel(result));
    match program.execute(&context).map_err(|e| e.to_string())? {
        CelValue::Bool(b) => Ok(b),
        other => Err(format!("condition returned {other:?}, expected a boolean")),
    }
}

fn to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(b) => CelValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else {
                CelValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => CelValue::from(s.clone()),
        Value::Array(items) => CelValue::from(items.iter().map(to_cel).collect::<Vec<_>>()),
        Value::Object(map) => CelValue::from(
            map.iter()
                .map(|(k, v)| (k.clone(), to_cel(v)))
                .collect::<HashMap<String, CelValue>>(),
        ),
    }
}

/// Classify one provider result.
///
/// Success wins, then failure. When neither holds the result is
/// inconclusive if a failure condition exists, otherwise failed.
pub fn classify(spec: &MetricSpec, result: &Value) -> (MeasurementStatus, Option<String>) {
    match evaluate_condition(&spec.success_condition, result) {
        Ok(true) => return (MeasurementStatus::Passed, None),
        Ok(false) => {}
        Err(e) => {
            return (
                MeasurementStatus::Failed,
                Some(format!("Success condition error: {e}")),
            )
        }
    }
    let Some(failure) = &spec.failure_condition else {
        return (
            MeasurementStatus::Failed,
            Some("Success condition not met".to_string()),
        );
    };
    match evaluate_condition(failure, result) {
        Ok(true) => (
            MeasurementStatus::Failed,
            Some("Failure condition met".to_string()),
        ),
        Ok(false) => (MeasurementStatus::Inconclusive, None),
        Err(e) => (
            MeasurementStatus::Failed,
            Some(format!("Failure condition error: {e}")),
        ),
    }
}
