//! Time budget helpers for plan deadlines.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Longest plan budget honored; larger configured budgets are clamped to it.
pub const MAX_PLAN_BUDGET: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline for a plan run starting at `start`.
///
/// `plan_timeout` is clamped to [`MAX_PLAN_BUDGET`] so any configured value
/// yields a representable instant.
pub fn plan_deadline(start: Instant, plan_timeout: Duration) -> Instant {
    let budget = plan_timeout.min(MAX_PLAN_BUDGET);
    start.checked_add(budget).unwrap_or(start)
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("plan deadline exceeded"));
    }
    Ok(remaining)
}

/// Per-step timeout: the configured step limit, capped by what remains of the plan budget.
pub fn step_timeout(deadline: Instant, step_limit: Duration) -> Result<Duration> {
    Ok(remaining_budget(deadline)?.min(step_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_is_an_error() {
        let deadline = Instant::now();
        std::thread::sleep(Duration::from_millis(2));
        let err = remaining_budget(deadline).unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn huge_plan_timeout_is_clamped() {
        let start = Instant::now();
        let deadline = plan_deadline(start, Duration::from_secs(u64::MAX));
        assert_eq!(deadline - start, MAX_PLAN_BUDGET);
    }

    #[test]
    fn plan_deadline_within_cap_is_exact() {
        let start = Instant::now();
        let deadline = plan_deadline(start, Duration::from_secs(90));
        assert_eq!(deadline - start, Duration::from_secs(90));
    }

    #[test]
    fn step_timeout_is_capped_by_step_limit() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let timeout = step_timeout(deadline, Duration::from_secs(5)).expect("timeout");
        assert_eq!(timeout, Duration::from_secs(5));
    }
}
