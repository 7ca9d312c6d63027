use std::sync::Arc;

use taskdeps_config::{NotificationConfig, ViolationConfig};
use taskdeps_domain::{
    ChainDirection, DependencyError, DependencyService, DependencyType, DependencyUpdate, Direction,
    NewDependency, NotificationType, Task, TaskRepository, TaskStatus, ViolationState,
};
use taskdeps_testing_utils::{day, FixedClock, MockRepositories, TaskBuilder};

struct Harness {
    mocks: MockRepositories,
    service: DependencyService,
}

fn harness() -> Harness {
    let mocks = MockRepositories::new();
    let service = DependencyService::new(
        mocks.repositories(),
        &NotificationConfig::default(),
        &ViolationConfig::default(),
    )
    .with_clock(Arc::new(FixedClock::default()));
    Harness { mocks, service }
}

impl Harness {
    async fn task(&self, builder: TaskBuilder) -> Task {
        self.mocks.tasks.create(&builder.build()).await.unwrap()
    }

    fn notifications_of(&self, kind: NotificationType) -> usize {
        self.mocks
            .notifications
            .get_all()
            .iter()
            .filter(|n| n.notification_type == kind)
            .count()
    }
}

#[tokio::test]
async fn test_duplicate_triple_rejected_but_other_type_allowed() {
    let h = harness();
    let a = h.task(TaskBuilder::new().with_title("design")).await;
    let b = h.task(TaskBuilder::new().with_title("build")).await;

    h.service
        .create_dependency(NewDependency::new(a.id, b.id), None)
        .await
        .unwrap();

    let err = h
        .service
        .create_dependency(NewDependency::new(a.id, b.id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::DuplicateDependency { .. }));
    assert!(err.is_client_error());

    let ss = h
        .service
        .create_dependency(
            NewDependency::new(a.id, b.id).with_type(DependencyType::StartToStart),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ss.dependency_type, DependencyType::StartToStart);
    assert_eq!(h.mocks.dependencies.count(), 2);
}

#[tokio::test]
async fn test_cycles_and_self_loops_rejected() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;
    let b = h.task(TaskBuilder::new()).await;
    let c = h.task(TaskBuilder::new()).await;

    h.service.create_dependency(NewDependency::new(a.id, b.id), None).await.unwrap();
    h.service.create_dependency(NewDependency::new(b.id, c.id), None).await.unwrap();

    let err = h
        .service
        .create_dependency(NewDependency::new(c.id, a.id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::CyclicDependency { .. }));

    let err = h
        .service
        .create_dependency(NewDependency::new(a.id, a.id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::CyclicDependency { .. }));

    assert!(h.service.check_circular(c.id, a.id).await.unwrap());
    assert!(!h.service.check_circular(a.id, c.id).await.unwrap());
    assert_eq!(h.mocks.dependencies.count(), 2);
}

#[tokio::test]
async fn test_missing_task_is_not_found() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;

    let err = h
        .service
        .create_dependency(NewDependency::new(a.id, 999), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::TaskNotFound { id: 999 }));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_finish_to_start_with_lag_tracks_violation_and_resolution() {
    let h = harness();
    let pred = h
        .task(TaskBuilder::new().scheduled(day(0), day(10)).with_assignees(vec![1]))
        .await;
    let succ = h
        .task(TaskBuilder::new().scheduled(day(11), day(20)).with_assignees(vec![2]))
        .await;

    // predecessor finishes day 10, two day lag, successor starts day 11
    let dep = h
        .service
        .create_dependency(NewDependency::new(pred.id, succ.id).with_lag(48), None)
        .await
        .unwrap();
    assert_eq!(dep.violation_state, ViolationState::Violation);
    assert_eq!(h.notifications_of(NotificationType::DependencyCreated), 2);
    assert_eq!(h.notifications_of(NotificationType::DependencyViolation), 2);

    // starting exactly on day 12 satisfies the lag with no slack left
    let (_, reports) = h
        .service
        .update_task_dates(succ.id, Some(day(12)), Some(day(20)))
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].previous, ViolationState::Violation);
    assert_eq!(reports[0].current, ViolationState::Warning);
    assert_eq!(reports[0].event, Some(NotificationType::DependencyResolved));

    let (_, reports) = h
        .service
        .update_task_dates(succ.id, Some(day(15)), Some(day(20)))
        .await
        .unwrap();
    assert_eq!(reports[0].current, ViolationState::None);
    assert_eq!(h.notifications_of(NotificationType::DependencyResolved), 4);

    // re-checking an unchanged schedule emits nothing new
    let reports = h.service.check_violations_for_task(succ.id).await.unwrap();
    assert!(!reports[0].changed());
    assert_eq!(reports[0].event, None);
    assert_eq!(
        h.service.get_dependency(dep.id).await.unwrap().violation_state,
        ViolationState::None
    );
}

#[tokio::test]
async fn test_update_keeps_endpoints_fixed() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;
    let b = h.task(TaskBuilder::new()).await;
    let c = h.task(TaskBuilder::new()).await;
    let dep = h.service.create_dependency(NewDependency::new(a.id, b.id), None).await.unwrap();

    let err = h
        .service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                successor_task_id: Some(c.id),
                ..DependencyUpdate::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::ImmutableEndpoints { .. }));

    let updated = h
        .service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                dependency_type: Some(DependencyType::FinishToFinish),
                lag_time: Some(24),
                ..DependencyUpdate::default()
            },
            Some(5),
        )
        .await
        .unwrap();
    assert_eq!(updated.dependency_type, DependencyType::FinishToFinish);
    assert_eq!(updated.lag_time, 24);
    assert_eq!(updated.updated_by, Some(5));
}

#[tokio::test]
async fn test_deactivated_edge_no_longer_blocks_cycle_check() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;
    let b = h.task(TaskBuilder::new()).await;
    let dep = h.service.create_dependency(NewDependency::new(a.id, b.id), None).await.unwrap();

    h.service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                is_active: Some(false),
                ..DependencyUpdate::default()
            },
            None,
        )
        .await
        .unwrap();

    h.service.create_dependency(NewDependency::new(b.id, a.id), None).await.unwrap();
    let active = h
        .service
        .list_task_dependencies(a.id, Direction::Both, false)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    let all = h
        .service
        .list_task_dependencies(a.id, Direction::Both, true)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    // reactivating would now close a loop
    let err = h
        .service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                is_active: Some(true),
                ..DependencyUpdate::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DependencyError::CyclicDependency { .. }));
}

#[tokio::test]
async fn test_deleting_a_task_cascades_to_its_dependencies() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;
    let b = h.task(TaskBuilder::new()).await;
    let c = h.task(TaskBuilder::new()).await;
    let ab = h.service.create_dependency(NewDependency::new(a.id, b.id), None).await.unwrap();
    let bc = h.service.create_dependency(NewDependency::new(b.id, c.id), None).await.unwrap();
    h.service.create_dependency(NewDependency::new(a.id, c.id), None).await.unwrap();

    let deletion = h.service.delete_task(b.id).await.unwrap();
    let mut removed = deletion.removed_dependencies.clone();
    removed.sort();
    assert_eq!(removed, vec![ab.id, bc.id]);
    assert_eq!(h.mocks.dependencies.count(), 1);
    assert!(matches!(
        h.service.get_dependency(ab.id).await.unwrap_err(),
        DependencyError::DependencyNotFound { .. }
    ));
}

#[tokio::test]
async fn test_removal_notice_outlives_dependency() {
    let h = harness();
    let a = h.task(TaskBuilder::new().with_assignees(vec![1])).await;
    let b = h.task(TaskBuilder::new()).await;
    let dep = h
        .service
        .create_dependency(NewDependency::new(a.id, b.id).silent(), None)
        .await
        .unwrap();
    assert_eq!(h.mocks.notifications.count(), 0);

    h.service.delete_dependency(dep.id, Some(1)).await.unwrap();
    assert_eq!(h.mocks.dependencies.count(), 0);
    let notices = h.mocks.notifications.get_all();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].dependency_id, dep.id);
    assert_eq!(notices[0].notification_type, NotificationType::DependencyRemoved);
}

#[tokio::test]
async fn test_status_changes_notify_the_other_side() {
    let h = harness();
    let a = h.task(TaskBuilder::new().with_assignees(vec![1])).await;
    let b = h.task(TaskBuilder::new().with_assignees(vec![2])).await;
    h.service
        .create_dependency(NewDependency::new(a.id, b.id).silent(), None)
        .await
        .unwrap();

    let validation = h
        .service
        .validate_status_change(b.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.violations.len(), 1);
    // moving back to todo is never gated
    assert!(h.service.validate_status_change(b.id, TaskStatus::Todo).await.unwrap().valid);

    h.service.task_status_changed(a.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(h.notifications_of(NotificationType::PredecessorStarted), 2);
    assert_eq!(h.notifications_of(NotificationType::SuccessorUnblocked), 0);

    h.service.task_status_changed(a.id, TaskStatus::Completed).await.unwrap();
    assert_eq!(h.notifications_of(NotificationType::PredecessorCompleted), 2);
    assert_eq!(h.notifications_of(NotificationType::SuccessorUnblocked), 2);

    assert!(h.service.validate_status_change(b.id, TaskStatus::InProgress).await.unwrap().valid);
}

#[tokio::test]
async fn test_starting_a_blocked_task_raises_blocked_event() {
    let h = harness();
    let a = h.task(TaskBuilder::new().with_assignees(vec![1])).await;
    let b = h.task(TaskBuilder::new().with_assignees(vec![2])).await;
    h.service
        .create_dependency(NewDependency::new(a.id, b.id).silent(), None)
        .await
        .unwrap();

    let task = h.service.task_status_changed(b.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(h.notifications_of(NotificationType::SuccessorBlocked), 2);

    // same status again is a no-op
    h.service.task_status_changed(b.id, TaskStatus::InProgress).await.unwrap();
    assert_eq!(h.notifications_of(NotificationType::SuccessorBlocked), 2);
}

#[tokio::test]
async fn test_unblocked_waits_for_every_predecessor() {
    let h = harness();
    let a = h.task(TaskBuilder::new()).await;
    let b = h.task(TaskBuilder::new()).await;
    let c = h.task(TaskBuilder::new().with_assignees(vec![3])).await;
    h.service.create_dependency(NewDependency::new(a.id, c.id).silent(), None).await.unwrap();
    h.service.create_dependency(NewDependency::new(b.id, c.id).silent(), None).await.unwrap();

    h.service.task_status_changed(a.id, TaskStatus::Completed).await.unwrap();
    assert_eq!(h.notifications_of(NotificationType::SuccessorUnblocked), 0);

    h.service.task_status_changed(b.id, TaskStatus::Completed).await.unwrap();
    assert_eq!(h.notifications_of(NotificationType::SuccessorUnblocked), 1);
}

#[tokio::test]
async fn test_chain_and_project_order() {
    let h = harness();
    let a = h.task(TaskBuilder::new().in_project(7)).await;
    let b = h.task(TaskBuilder::new().in_project(7)).await;
    let c = h.task(TaskBuilder::new().in_project(7)).await;
    let d = h.task(TaskBuilder::new().in_project(7)).await;
    let ab = h.service.create_dependency(NewDependency::new(a.id, b.id).silent(), None).await.unwrap();
    let bc = h.service.create_dependency(NewDependency::new(b.id, c.id).silent(), None).await.unwrap();

    let forward: Vec<i64> = h
        .service
        .dependency_chain(a.id, ChainDirection::Forward)
        .await
        .unwrap()
        .iter()
        .map(|dep| dep.id)
        .collect();
    assert_eq!(forward, vec![ab.id, bc.id]);

    let backward = h.service.dependency_chain(c.id, ChainDirection::Backward).await.unwrap();
    assert_eq!(backward.len(), 2);

    let order = h.service.project_task_order(7).await.unwrap();
    assert_eq!(order.len(), 4);
    let pos = |id| order.iter().position(|t| *t == id).unwrap();
    assert!(pos(a.id) < pos(b.id));
    assert!(pos(b.id) < pos(c.id));
    assert!(order.contains(&d.id));

    assert_eq!(h.service.list_project_dependencies(7, false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_one_day_warning_window_example() {
    let mocks = MockRepositories::new();
    let service = DependencyService::new(
        mocks.repositories(),
        &NotificationConfig::default(),
        &ViolationConfig { warning_days: 1 },
    )
    .with_clock(Arc::new(FixedClock::default()));
    let pred = mocks.tasks.create(&TaskBuilder::new().scheduled(day(0), day(10)).build()).await.unwrap();
    let succ = mocks.tasks.create(&TaskBuilder::new().scheduled(day(11), day(20)).build()).await.unwrap();
    let dep = service
        .create_dependency(NewDependency::new(pred.id, succ.id).with_lag(48).silent(), None)
        .await
        .unwrap();
    assert_eq!(dep.violation_state, ViolationState::Violation);

    for (start, expected) in [
        (13, ViolationState::None),
        (12, ViolationState::Warning),
        (11, ViolationState::Violation),
    ] {
        let (_, reports) = service
            .update_task_dates(succ.id, Some(day(start)), Some(day(20)))
            .await
            .unwrap();
        assert_eq!(reports[0].current, expected, "successor starting on day {start}");
    }
}

#[tokio::test]
async fn test_deactivating_violated_dependency_is_not_a_resolution() {
    let h = harness();
    let pred = h
        .task(TaskBuilder::new().scheduled(day(0), day(10)).with_assignees(vec![1]))
        .await;
    let succ = h
        .task(TaskBuilder::new().scheduled(day(5), day(20)).with_assignees(vec![2]))
        .await;
    let dep = h
        .service
        .create_dependency(NewDependency::new(pred.id, succ.id), None)
        .await
        .unwrap();
    assert_eq!(dep.violation_state, ViolationState::Violation);

    let off = h
        .service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                is_active: Some(false),
                ..DependencyUpdate::default()
            },
            None,
        )
        .await
        .unwrap();
    assert!(!off.is_active);
    assert_eq!(off.violation_state, ViolationState::None);
    assert_eq!(h.notifications_of(NotificationType::DependencyUpdated), 2);
    assert_eq!(h.notifications_of(NotificationType::DependencyResolved), 0);

    // switching it back on with the same dates is a fresh violation
    let on = h
        .service
        .update_dependency(
            dep.id,
            DependencyUpdate {
                is_active: Some(true),
                ..DependencyUpdate::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(on.violation_state, ViolationState::Violation);
    assert_eq!(h.notifications_of(NotificationType::DependencyViolation), 4);
    assert_eq!(h.notifications_of(NotificationType::DependencyResolved), 0);
}
