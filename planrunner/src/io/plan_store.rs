//! Plan file loading with schema + invariant validation.
//!
//! Plans read from disk are held to a stricter contract than plans extracted
//! from model text: every step must carry its number and an operation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::extract::plan_from_object;
use crate::core::invariants::dangling_branches;
use crate::core::types::Plan;

/// JSON Schema for plan files.
pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Load and validate a plan file (schema + invariants).
pub fn load_plan(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    parse_plan_value(&value).with_context(|| format!("load plan {}", path.display()))
}

/// Validate an already-parsed plan document.
pub fn parse_plan_value(value: &Value) -> Result<Plan> {
    validate_schema(value)?;
    let object: &Map<String, Value> = value
        .as_object()
        .ok_or_else(|| anyhow!("plan document must be an object"))?;
    let plan = plan_from_object(object).context("plan invariants failed")?;
    for (from, to) in dangling_branches(&plan) {
        warn!(step = from, target = to, "branch target does not exist");
    }
    debug!(steps = plan.steps.len(), "plan loaded");
    Ok(plan)
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_valid_plan_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        let doc = json!({
            "plan": [
                {"step": 1, "operation": "file.create",
                 "parameters": {"filename": "a.txt", "content": "hi"}, "on_success": [2]},
                {"step": 2, "operation": "file.read", "parameters": {"filename": "a.txt"}}
            ],
            "language": "en"
        });
        fs::write(&path, doc.to_string()).expect("write");

        let plan = load_plan(&path).expect("load");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].on_success, vec![2]);
        assert_eq!(plan.overall_confidence, 0.95);
    }

    #[test]
    fn missing_step_number_fails_schema() {
        let err = parse_plan_value(&json!({"plan": [{"operation": "file.read"}]}))
            .expect_err("must fail");
        assert!(err.to_string().contains("plan schema validation failed"));
    }

    #[test]
    fn duplicate_steps_fail_invariants() {
        let err = parse_plan_value(&json!({"plan": [
            {"step": 1, "operation": "a"},
            {"step": 1, "operation": "b"}
        ]}))
        .expect_err("must fail");
        assert!(format!("{err:#}").contains("duplicate step number 1"));
    }

    #[test]
    fn embedded_schema_compiles() {
        let schema: Value = serde_json::from_str(PLAN_SCHEMA).expect("schema json");
        validator_for(&schema).expect("schema compiles");
    }
}
