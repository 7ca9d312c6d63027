use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskdeps_config::{ViolationConfig, MAX_WARNING_DAYS};

use crate::entities::{Task, TaskDependency};
use crate::rules::{evaluate_dependency, ConstraintCheck};
use crate::value_objects::{
    DependencyType, NotificationType, TaskId, ViolationState,
};

/// Outcome of re-checking one dependency, including the state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub dependency_id: i64,
    pub predecessor_task_id: TaskId,
    pub successor_task_id: TaskId,
    pub dependency_type: DependencyType,
    pub previous: ViolationState,
    pub current: ViolationState,
    pub required: Option<DateTime<Utc>>,
    pub actual: Option<DateTime<Utc>>,
    pub slack_seconds: Option<i64>,
    pub event: Option<NotificationType>,
}

impl ViolationReport {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Event emitted when the stored state moves from `previous` to `current`.
///
/// Re-evaluating an unchanged state emits nothing. Leaving `violation`
/// counts as resolution even when the new state is `warning`.
pub fn transition_event(previous: ViolationState, current: ViolationState) -> Option<NotificationType> {
    use ViolationState::*;
    match (previous, current) {
        (p, c) if p == c => Option::None,
        (_, Violation) => Some(NotificationType::DependencyViolation),
        (Violation, _) | (Warning, None) => Some(NotificationType::DependencyResolved),
        (None, Warning) => Some(NotificationType::DependencyWarning),
        _ => Option::None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViolationDetector {
    warning_window: Duration,
}

impl ViolationDetector {
    pub fn new(warning_days: i64) -> Self {
        Self {
            warning_window: Duration::days(warning_days.clamp(0, MAX_WARNING_DAYS)),
        }
    }

    pub fn from_config(config: &ViolationConfig) -> Self {
        Self::new(config.warning_days)
    }

    pub fn warning_window(&self) -> Duration {
        self.warning_window
    }

    pub fn evaluate(&self, dependency: &TaskDependency, predecessor: &Task, successor: &Task) -> ConstraintCheck {
        evaluate_dependency(dependency, predecessor, successor, self.warning_window)
    }

    pub fn report(&self, dependency: &TaskDependency, predecessor: &Task, successor: &Task) -> ViolationReport {
        let check = self.evaluate(dependency, predecessor, successor);
        ViolationReport {
            dependency_id: dependency.id,
            predecessor_task_id: dependency.predecessor_task_id,
            successor_task_id: dependency.successor_task_id,
            dependency_type: dependency.dependency_type,
            previous: dependency.violation_state,
            current: check.state,
            required: check.required,
            actual: check.actual,
            slack_seconds: check.slack_seconds,
            event: transition_event(dependency.violation_state, check.state),
        }
    }
}

impl Default for ViolationDetector {
    fn default() -> Self {
        Self::from_config(&ViolationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NewDependency;
    use chrono::TimeZone;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, n, 0, 0, 0).unwrap()
    }

    fn task(id: i64, start: u32, finish: u32) -> Task {
        let mut task = Task::new(format!("task-{id}"));
        task.id = id;
        task.start_date = Some(day(start));
        task.due_date = Some(day(finish));
        task
    }

    fn fs_dependency(lag_hours: i32) -> TaskDependency {
        let mut dep = TaskDependency::from_new(
            &NewDependency::new(1, 2).with_lag(lag_hours),
            None,
            Utc::now(),
        );
        dep.id = 10;
        dep
    }

    #[test]
    fn test_transition_events() {
        use ViolationState::*;
        assert_eq!(transition_event(None, None), Option::None);
        assert_eq!(transition_event(Violation, Violation), Option::None);
        assert_eq!(
            transition_event(None, Violation),
            Some(NotificationType::DependencyViolation)
        );
        assert_eq!(
            transition_event(Warning, Violation),
            Some(NotificationType::DependencyViolation)
        );
        assert_eq!(
            transition_event(None, Warning),
            Some(NotificationType::DependencyWarning)
        );
        assert_eq!(
            transition_event(Violation, None),
            Some(NotificationType::DependencyResolved)
        );
        assert_eq!(
            transition_event(Violation, Warning),
            Some(NotificationType::DependencyResolved)
        );
        assert_eq!(
            transition_event(Warning, None),
            Some(NotificationType::DependencyResolved)
        );
    }

    #[test]
    fn test_report_new_violation_then_resolution() {
        let detector = ViolationDetector::new(1);
        let pred = task(1, 1, 10);
        let mut dep = fs_dependency(48);

        let report = detector.report(&dep, &pred, &task(2, 11, 20));
        assert_eq!(report.current, ViolationState::Violation);
        assert_eq!(report.event, Some(NotificationType::DependencyViolation));
        assert!(report.changed());

        dep.violation_state = report.current;
        let again = detector.report(&dep, &pred, &task(2, 11, 20));
        assert_eq!(again.event, Option::None);

        let resolved = detector.report(&dep, &pred, &task(2, 13, 20));
        assert_eq!(resolved.current, ViolationState::None);
        assert_eq!(resolved.event, Some(NotificationType::DependencyResolved));
    }

    #[test]
    fn test_oversized_warning_days_saturate() {
        let detector = ViolationDetector::new(i64::MAX);
        assert_eq!(detector.warning_window(), Duration::days(MAX_WARNING_DAYS));
        let report = detector.report(&fs_dependency(0), &task(1, 1, 10), &task(2, 20, 25));
        assert_eq!(report.current, ViolationState::Warning);
    }

    #[test]
    fn test_inactive_dependency_reports_none() {
        let detector = ViolationDetector::new(1);
        let mut dep = fs_dependency(48);
        dep.is_active = false;
        let report = detector.report(&dep, &task(1, 1, 10), &task(2, 2, 20));
        assert_eq!(report.current, ViolationState::None);
    }
}
