//! Plan and execution result types shared by the extractor and the controller.
//!
//! These types define the stable JSON contracts: the plan shape consumed from
//! AI responses and the execution report handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default `overall_confidence` when a plan response omits it.
pub const DEFAULT_PLAN_CONFIDENCE: f64 = 0.95;

/// Default per-step confidence when a step omits it.
pub const DEFAULT_STEP_CONFIDENCE: f64 = 1.0;

/// Parameter map passed to operation handlers.
pub type Parameters = Map<String, Value>;

/// One executable unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Positive step number, unique within its plan.
    pub step: u32,
    #[serde(default)]
    pub description: String,
    /// Dot-namespaced or flat operation identifier (`file.create`, `execute_shell_command`).
    pub operation: String,
    /// Handler parameters. Keys prefixed with `$` are captured into execution state.
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default = "default_step_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(default)]
    pub on_success: Vec<u32>,
    #[serde(default)]
    pub on_failure: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

fn default_step_confidence() -> f64 {
    DEFAULT_STEP_CONFIDENCE
}

fn default_plan_confidence() -> f64 {
    DEFAULT_PLAN_CONFIDENCE
}

impl PlanStep {
    /// Build a step with default metadata and no branches.
    pub fn new(step: u32, operation: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            step,
            description: String::new(),
            operation: operation.into(),
            parameters,
            confidence: DEFAULT_STEP_CONFIDENCE,
            condition: None,
            on_success: Vec::new(),
            on_failure: Vec::new(),
            explanation: None,
        }
    }
}

/// Ordered collection of steps derived from one AI interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    #[serde(default = "default_plan_confidence")]
    pub overall_confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<Value>,
    #[serde(default)]
    pub language: String,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            overall_confidence: DEFAULT_PLAN_CONFIDENCE,
            alternatives: Vec::new(),
            language: String::new(),
        }
    }

    /// Look up a step by its number.
    pub fn find_step(&self, number: u32) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.step == number)
    }
}

/// Outcome classification for one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
    /// Condition evaluated false; branches are not followed.
    Skipped,
    /// Operation matched nothing in the routing table (or no handler is registered).
    Unsupported,
}

impl StepStatus {
    /// True if the step counts towards `failed_steps` and follows `on_failure`.
    pub fn is_failure(self) -> bool {
        matches!(self, StepStatus::Error | StepStatus::Unsupported)
    }
}

/// Record of one step execution, appended to the ordered results list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: u32,
    pub status: StepStatus,
    #[serde(default)]
    pub output: Value,
    pub operation: String,
    /// Parameters as dispatched (after `$` capture and substitution).
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Number of handler dispatches (0 when skipped or unsupported).
    #[serde(default)]
    pub attempts: u32,
}

/// Run history of one controller, persisted after every plan run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionState {
    /// Step number most recently started (0 before the first step).
    pub current_step: u32,
    pub completed_steps: Vec<u32>,
    pub failed_steps: Vec<u32>,
    /// Variables captured from `$`-prefixed parameters.
    pub state_variables: Map<String, Value>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Fresh state for a new run, stamped with the current time.
    pub fn started_now() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }
}

/// Overall outcome of `execute_plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Execution report returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: ReportStatus,
    pub results: Vec<StepResult>,
    pub execution_state: ExecutionState,
    pub plan: Plan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
