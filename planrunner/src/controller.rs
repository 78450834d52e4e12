//! Plan Execution Controller.
//!
//! Runs a [`Plan`] step by step through the handler registry, following
//! `on_success`/`on_failure` branches depth-first. Each step runs at most once
//! per run; failures are recorded on the step and never abort the plan. The
//! execution state is persisted through a [`StateStore`] after every run.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::core::budget::{plan_deadline, step_timeout};
use crate::core::condition::ConditionEvaluator;
use crate::core::invariants::validate_invariants;
use crate::core::operation::Operation;
use crate::core::types::{
    ExecutionReport, ExecutionState, Parameters, Plan, PlanStep, ReportStatus, StepResult,
    StepStatus,
};
use crate::core::variables::prepare_parameters;
use crate::io::config::ControllerConfig;
use crate::io::handlers::{HandlerRegistry, HandlerRequest};
use crate::io::state_store::StateStore;

pub struct PlanController<S: StateStore> {
    store: S,
    handlers: HandlerRegistry,
    conditions: Box<dyn ConditionEvaluator>,
    config: ControllerConfig,
    state: ExecutionState,
    /// Re-dispatches left in the current run.
    recovery_budget: u32,
}

impl<S: StateStore> PlanController<S> {
    /// Build a controller, loading any previously persisted state from `store`.
    pub fn new(
        store: S,
        handlers: HandlerRegistry,
        conditions: Box<dyn ConditionEvaluator>,
        config: ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let state = store.load()?.unwrap_or_default();
        debug!(
            completed = state.completed_steps.len(),
            failed = state.failed_steps.len(),
            "controller state loaded"
        );
        Ok(Self {
            store,
            handlers,
            conditions,
            recovery_budget: config.max_recovery_attempts,
            config,
            state,
        })
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Reset state and persist the empty record.
    pub fn clear_state(&mut self) -> Result<()> {
        self.state = ExecutionState::default();
        self.store.save(&self.state)?;
        info!("execution state cleared");
        Ok(())
    }

    /// Execute every reachable step of `plan` and report the outcome.
    ///
    /// Never fails: invariant violations and persistence errors come back as
    /// `status = error` with whatever results and state exist.
    #[instrument(skip_all, fields(steps = plan.steps.len()))]
    pub fn execute_plan(&mut self, plan: &Plan) -> ExecutionReport {
        let violations = validate_invariants(plan);
        if !violations.is_empty() {
            let message = format!("invalid plan: {}", violations.join("; "));
            warn!(%message, "refusing to execute plan");
            return self.report(plan, Vec::new(), ReportStatus::Error, Some(message));
        }

        self.state = ExecutionState::started_now();
        self.recovery_budget = self.config.max_recovery_attempts;
        let deadline = plan_deadline(
            Instant::now(),
            Duration::from_secs(self.config.plan_timeout_secs),
        );
        info!("executing plan");

        let mut visited: HashSet<u32> = HashSet::new();
        let mut results = Vec::new();
        for top in &plan.steps {
            if visited.contains(&top.step) {
                continue;
            }
            let mut pending = vec![top.step];
            while let Some(number) = pending.pop() {
                if !visited.insert(number) {
                    debug!(step = number, "already visited, not running again");
                    continue;
                }
                let Some(step) = plan.find_step(number) else {
                    warn!(step = number, "branch target does not exist, ignoring");
                    continue;
                };
                let result = self.execute_step(step, deadline);
                let branches: &[u32] = match result.status {
                    StepStatus::Success => &step.on_success,
                    status if status.is_failure() => &step.on_failure,
                    _ => &[],
                };
                pending.extend(branches.iter().rev().copied());
                results.push(result);
            }
        }

        self.state.end_time = Some(Utc::now());
        if let Err(err) = self.store.save(&self.state) {
            let message = format!("persist execution state: {err:#}");
            error!(%message, "plan finished but state was not saved");
            return self.report(plan, results, ReportStatus::Error, Some(message));
        }

        let status = if self.state.failed_steps.is_empty() {
            ReportStatus::Success
        } else {
            ReportStatus::PartialSuccess
        };
        info!(
            ?status,
            completed = self.state.completed_steps.len(),
            failed = self.state.failed_steps.len(),
            "plan finished"
        );
        self.report(plan, results, status, None)
    }

    /// Execute one step and fold its outcome into the execution state.
    ///
    /// Branches are not followed here; that is `execute_plan`'s job.
    #[instrument(skip_all, fields(step = step.step, operation = %step.operation))]
    pub fn execute_step(&mut self, step: &PlanStep, deadline: Instant) -> StepResult {
        self.state.current_step = step.step;

        if let Some(condition) = &step.condition {
            match self.conditions.evaluate(condition, &self.state) {
                Ok(true) => {}
                Ok(false) => {
                    info!("condition is false, skipping step");
                    return StepResult {
                        step: step.step,
                        status: StepStatus::Skipped,
                        output: Value::Null,
                        operation: step.operation.clone(),
                        parameters: step.parameters.clone(),
                        error: None,
                        explanation: step.explanation.clone(),
                        attempts: 0,
                    };
                }
                Err(err) => {
                    let message = format!("condition evaluation failed: {err:#}");
                    return self.fail(step, step.parameters.clone(), StepStatus::Error, message, 0);
                }
            }
        }

        let prepared = prepare_parameters(&step.parameters, &self.state.state_variables);
        self.state.state_variables.extend(prepared.captured);
        let parameters = prepared.dispatch;

        let operation = Operation::route(&step.operation, &parameters);
        let Some(kind) = operation.handler_kind() else {
            let message = format!("Unsupported operation: {}", step.operation);
            return self.fail(step, parameters, StepStatus::Unsupported, message, 0);
        };
        let Some(handler) = self.handlers.get(kind) else {
            let message = format!("no handler registered for {kind} operations");
            return self.fail(step, parameters, StepStatus::Unsupported, message, 0);
        };

        let step_limit = Duration::from_secs(self.config.step_timeout_secs);
        let mut attempts = 0;
        let mut last_error: Option<anyhow::Error> = None;
        let outcome = loop {
            let timeout = match step_timeout(deadline, step_limit) {
                Ok(timeout) => timeout,
                Err(err) => match last_error.take() {
                    Some(last) => {
                        break Err(last.context(format!("{err} after {attempts} attempt(s)")));
                    }
                    None => break Err(err),
                },
            };
            attempts += 1;
            let request = HandlerRequest {
                operation: &operation,
                parameters: &parameters,
                timeout,
            };
            match handler.handle(&request) {
                Ok(output) => break Ok(output),
                Err(err) if self.recovery_budget > 0 => {
                    self.recovery_budget -= 1;
                    warn!(
                        attempt = attempts,
                        recovery_left = self.recovery_budget,
                        err = %format!("{err:#}"),
                        "step failed, retrying"
                    );
                    last_error = Some(err);
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(output) => {
                for name in &prepared.output_captures {
                    self.state
                        .state_variables
                        .insert(name.clone(), output.clone());
                }
                push_unique(&mut self.state.completed_steps, step.step);
                info!(attempts, "step succeeded");
                StepResult {
                    step: step.step,
                    status: StepStatus::Success,
                    output,
                    operation: step.operation.clone(),
                    parameters,
                    error: None,
                    explanation: step.explanation.clone(),
                    attempts,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.fail(step, parameters, StepStatus::Error, message, attempts)
            }
        }
    }

    fn fail(
        &mut self,
        step: &PlanStep,
        parameters: Parameters,
        status: StepStatus,
        message: String,
        attempts: u32,
    ) -> StepResult {
        warn!(?status, error = %message, "step failed");
        push_unique(&mut self.state.failed_steps, step.step);
        let output = match status {
            StepStatus::Unsupported => Value::String(message.clone()),
            _ => Value::Null,
        };
        StepResult {
            step: step.step,
            status,
            output,
            operation: step.operation.clone(),
            parameters,
            error: Some(message),
            explanation: step.explanation.clone(),
            attempts,
        }
    }

    fn report(
        &self,
        plan: &Plan,
        results: Vec<StepResult>,
        status: ReportStatus,
        error: Option<String>,
    ) -> ExecutionReport {
        ExecutionReport {
            status,
            results,
            execution_state: self.state.clone(),
            plan: plan.clone(),
            error,
        }
    }
}

fn push_unique(steps: &mut Vec<u32>, step: u32) {
    if !steps.contains(&step) {
        steps.push(step);
    }
}
