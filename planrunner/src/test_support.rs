//! Test-only helpers for building plans and scripting handlers.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::operation::HandlerKind;
use crate::core::types::{Parameters, Plan, PlanStep};
use crate::io::handlers::{HandlerRequest, OperationHandler};

/// Create a deterministic step with no parameters or branches.
pub fn step(number: u32, operation: &str) -> PlanStep {
    PlanStep::new(number, operation, Parameters::new())
}

/// Create a step with parameters taken from a JSON object literal.
pub fn step_with(number: u32, operation: &str, parameters: Value) -> PlanStep {
    PlanStep::new(number, operation, params(parameters))
}

/// Create a plan with default metadata.
pub fn plan(steps: Vec<PlanStep>) -> Plan {
    Plan::new(steps)
}

/// Convert a JSON object literal into a parameter map (non-objects become empty).
pub fn params(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        _ => Parameters::new(),
    }
}

/// One recorded handler call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: String,
    pub parameters: Parameters,
}

/// Handler that replays scripted outcomes and records every call.
///
/// Outcomes are consumed in order; once the script is exhausted every call
/// succeeds with `null`. Clones share the script and the call log.
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    kind: HandlerKind,
    script: Rc<RefCell<VecDeque<Result<Value, String>>>>,
    calls: Rc<RefCell<Vec<RecordedCall>>>,
}

impl ScriptedHandler {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            script: Rc::default(),
            calls: Rc::default(),
        }
    }

    #[must_use]
    pub fn then_ok(self, output: Value) -> Self {
        self.script.borrow_mut().push_back(Ok(output));
        self
    }

    #[must_use]
    pub fn then_err(self, message: &str) -> Self {
        self.script.borrow_mut().push_back(Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl OperationHandler for ScriptedHandler {
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value> {
        self.calls.borrow_mut().push(RecordedCall {
            operation: format!("{:?}", request.operation),
            parameters: request.parameters.clone(),
        });
        match self.script.borrow_mut().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Value::Null),
        }
    }
}

/// Scratch directory holding plan files, responses, and state for one test.
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_path(&self) -> PathBuf {
        self.path().join("execution_state.json")
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write a plan document as pretty JSON.
    pub fn write_plan(&self, name: &str, document: &Value) -> Result<PathBuf> {
        let contents = serde_json::to_string_pretty(document).context("serialize plan")?;
        self.write(name, &contents)
    }

    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path().join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
