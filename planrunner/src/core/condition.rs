//! Pluggable evaluation of step conditions.
//!
//! A step's `condition` is an opaque JSON value. The controller asks a
//! [`ConditionEvaluator`] whether the step should run; returning `false`
//! marks the step skipped.

use anyhow::{Result, bail};
use serde_json::Value;

use crate::core::types::ExecutionState;

/// Decides whether a step with a condition should run.
pub trait ConditionEvaluator {
    fn evaluate(&self, condition: &Value, state: &ExecutionState) -> Result<bool>;
}

/// Evaluator that runs every step regardless of its condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrue;

impl ConditionEvaluator for AlwaysTrue {
    fn evaluate(&self, _condition: &Value, _state: &ExecutionState) -> Result<bool> {
        Ok(true)
    }
}

/// Small predicate language over the current execution state.
///
/// Recognized shapes:
/// - `true` / `false`
/// - `{"variable": "name"}`: the state variable is set and truthy
/// - `{"variable": "name", "equals": <value>}`: the state variable equals the value
/// - `{"step_succeeded": n}` / `{"step_failed": n}`
/// - `{"not": <condition>}`
///
/// Anything else evaluates to `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateConditions;

impl ConditionEvaluator for StateConditions {
    fn evaluate(&self, condition: &Value, state: &ExecutionState) -> Result<bool> {
        match condition {
            Value::Bool(flag) => Ok(*flag),
            Value::Object(map) => {
                if let Some(inner) = map.get("not") {
                    return Ok(!self.evaluate(inner, state)?);
                }
                if let Some(name) = map.get("variable") {
                    let Some(name) = name.as_str() else {
                        bail!("condition 'variable' must be a string");
                    };
                    let current = state.state_variables.get(name);
                    return Ok(match map.get("equals") {
                        Some(expected) => current == Some(expected),
                        None => current.is_some_and(is_truthy),
                    });
                }
                if let Some(step) = map.get("step_succeeded") {
                    return Ok(state.completed_steps.contains(&step_number(step)?));
                }
                if let Some(step) = map.get("step_failed") {
                    return Ok(state.failed_steps.contains(&step_number(step)?));
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }
}

fn step_number(value: &Value) -> Result<u32> {
    match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
        Some(n) => Ok(n),
        None => bail!("condition step reference must be a positive integer, got {value}"),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
