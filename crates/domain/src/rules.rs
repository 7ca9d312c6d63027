//! Date-based evaluation of a single dependency constraint.
//!
//! `required = predecessor anchor + lag`, `actual = successor anchor`,
//! `slack = actual - required`. Negative slack is a violation, slack below
//! the warning window is a warning.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Task, TaskDependency};
use crate::value_objects::{Anchor, DependencyType, ViolationState};

/// Planned start and finish of a task. Either end may be unscheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleWindow {
    pub start: Option<DateTime<Utc>>,
    pub finish: Option<DateTime<Utc>>,
}

impl ScheduleWindow {
    pub fn new(start: Option<DateTime<Utc>>, finish: Option<DateTime<Utc>>) -> Self {
        Self { start, finish }
    }

    pub fn anchor(&self, anchor: Anchor) -> Option<DateTime<Utc>> {
        match anchor {
            Anchor::Start => self.start,
            Anchor::Finish => self.finish,
        }
    }
}

impl From<&Task> for ScheduleWindow {
    fn from(task: &Task) -> Self {
        Self {
            start: task.start_date,
            finish: task.due_date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintCheck {
    pub state: ViolationState,
    pub required: Option<DateTime<Utc>>,
    pub actual: Option<DateTime<Utc>>,
    /// seconds; negative when the constraint is broken
    pub slack_seconds: Option<i64>,
}

impl ConstraintCheck {
    fn unscheduled(required: Option<DateTime<Utc>>, actual: Option<DateTime<Utc>>) -> Self {
        Self {
            state: ViolationState::None,
            required,
            actual,
            slack_seconds: None,
        }
    }

    pub fn slack(&self) -> Option<Duration> {
        self.slack_seconds.map(Duration::seconds)
    }
}

pub fn evaluate(
    dependency_type: DependencyType,
    lag: Duration,
    predecessor: &ScheduleWindow,
    successor: &ScheduleWindow,
    warning_window: Duration,
) -> ConstraintCheck {
    let required = predecessor
        .anchor(dependency_type.predecessor_anchor())
        .map(|at| at + lag);
    let actual = successor.anchor(dependency_type.successor_anchor());

    let (Some(required_at), Some(actual_at)) = (required, actual) else {
        return ConstraintCheck::unscheduled(required, actual);
    };

    let slack = actual_at - required_at;
    let state = if slack < Duration::zero() {
        ViolationState::Violation
    } else if slack < warning_window {
        ViolationState::Warning
    } else {
        ViolationState::None
    };

    ConstraintCheck {
        state,
        required,
        actual,
        slack_seconds: Some(slack.num_seconds()),
    }
}

/// Inactive dependencies impose nothing.
pub fn evaluate_dependency(
    dependency: &TaskDependency,
    predecessor: &Task,
    successor: &Task,
    warning_window: Duration,
) -> ConstraintCheck {
    if !dependency.is_active {
        return ConstraintCheck::unscheduled(None, None);
    }
    evaluate(
        dependency.dependency_type,
        dependency.lag(),
        &ScheduleWindow::from(predecessor),
        &ScheduleWindow::from(successor),
        warning_window,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, n, 0, 0, 0).unwrap()
    }

    fn finish_on(n: u32) -> ScheduleWindow {
        ScheduleWindow::new(Some(day(1)), Some(day(n)))
    }

    fn start_on(n: u32) -> ScheduleWindow {
        ScheduleWindow::new(Some(day(n)), Some(day(28)))
    }

    #[test]
    fn test_finish_to_start_with_two_day_lag() {
        let lag = Duration::days(2);
        let warning = Duration::days(1);
        let pred = finish_on(10);

        let check = evaluate(DependencyType::FinishToStart, lag, &pred, &start_on(11), warning);
        assert_eq!(check.state, ViolationState::Violation);
        assert_eq!(check.required, Some(day(12)));
        assert_eq!(check.slack(), Some(Duration::days(-1)));

        let check = evaluate(DependencyType::FinishToStart, lag, &pred, &start_on(13), warning);
        assert_eq!(check.state, ViolationState::None);

        let check = evaluate(DependencyType::FinishToStart, lag, &pred, &start_on(12), warning);
        assert_eq!(check.state, ViolationState::Warning);
    }

    #[test]
    fn test_start_to_start_uses_start_dates() {
        let pred = ScheduleWindow::new(Some(day(5)), Some(day(20)));
        let succ = ScheduleWindow::new(Some(day(4)), Some(day(25)));
        let check = evaluate(
            DependencyType::StartToStart,
            Duration::zero(),
            &pred,
            &succ,
            Duration::zero(),
        );
        assert_eq!(check.state, ViolationState::Violation);
    }

    #[test]
    fn test_finish_to_finish_and_start_to_finish() {
        let pred = ScheduleWindow::new(Some(day(5)), Some(day(20)));
        let succ = ScheduleWindow::new(Some(day(1)), Some(day(19)));
        let ff = evaluate(
            DependencyType::FinishToFinish,
            Duration::zero(),
            &pred,
            &succ,
            Duration::zero(),
        );
        assert_eq!(ff.state, ViolationState::Violation);

        let sf = evaluate(
            DependencyType::StartToFinish,
            Duration::zero(),
            &pred,
            &succ,
            Duration::zero(),
        );
        assert_eq!(sf.state, ViolationState::None);
    }

    #[test]
    fn test_missing_dates_are_not_evaluated() {
        let pred = ScheduleWindow::new(None, None);
        let check = evaluate(
            DependencyType::FinishToStart,
            Duration::zero(),
            &pred,
            &start_on(3),
            Duration::days(3),
        );
        assert_eq!(check.state, ViolationState::None);
        assert_eq!(check.slack_seconds, None);
    }

    #[test]
    fn test_negative_lag_allows_overlap() {
        let check = evaluate(
            DependencyType::FinishToStart,
            Duration::days(-2),
            &finish_on(10),
            &start_on(9),
            Duration::zero(),
        );
        assert_eq!(check.state, ViolationState::None);
    }
}
