//! Semantic plan invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::Plan;

/// Check semantic invariants of a plan:
/// - At least one step
/// - Step numbers are positive
/// - No duplicate step numbers
pub fn validate_invariants(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    if plan.steps.is_empty() {
        errors.push("plan has no steps".to_string());
    }

    let mut seen = HashSet::new();
    for (index, step) in plan.steps.iter().enumerate() {
        if step.step == 0 {
            errors.push(format!("steps[{index}]: step number must be > 0"));
        }
        if !seen.insert(step.step) {
            errors.push(format!("steps[{index}]: duplicate step number {}", step.step));
        }
    }
    errors
}

/// Branch targets that reference no step in the plan, as `(from, to)` pairs.
///
/// These are not errors: the controller ignores unknown targets.
pub fn dangling_branches(plan: &Plan) -> Vec<(u32, u32)> {
    let known: HashSet<u32> = plan.steps.iter().map(|step| step.step).collect();
    plan.steps
        .iter()
        .flat_map(|step| {
            step.on_success
                .iter()
                .chain(&step.on_failure)
                .filter(|target| !known.contains(target))
                .map(move |target| (step.step, *target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan, step};

    #[test]
    fn valid_plan_has_no_errors() {
        let plan = plan(vec![step(1, "file.read"), step(2, "file.delete")]);
        assert!(validate_invariants(&plan).is_empty());
    }

    #[test]
    fn reports_duplicate_and_zero_step_numbers() {
        let plan = plan(vec![
            step(0, "file.read"),
            step(2, "file.read"),
            step(2, "file.delete"),
        ]);

        let errors = validate_invariants(&plan);
        assert!(errors.iter().any(|err| err.contains("must be > 0")));
        assert!(
            errors
                .iter()
                .any(|err| err.contains("duplicate step number 2"))
        );
    }

    #[test]
    fn empty_plan_is_invalid() {
        let errors = validate_invariants(&plan(Vec::new()));
        assert_eq!(errors, vec!["plan has no steps".to_string()]);
    }

    #[test]
    fn dangling_branches_lists_unknown_targets() {
        let mut first = step(1, "file.read");
        first.on_success = vec![2, 9];
        first.on_failure = vec![7];
        let plan = plan(vec![first, step(2, "file.read")]);

        assert_eq!(dangling_branches(&plan), vec![(1, 9), (1, 7)]);
    }
}
