use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskdeps_config::{NotificationConfig, ViolationConfig};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::entities::{
    DependencyNotification, DependencyUpdate, NewDependency, NotificationPreference, Task,
    TaskDependency, TaskStatus,
};
use crate::events::DependencyEvent;
use crate::graph::DependencyGraph;
use crate::policy::{collect_recipients, NotificationPolicy, RecipientContext};
use crate::preferences::PreferenceService;
use crate::repositories::Repositories;
use crate::templates::TemplateRegistry;
use crate::value_objects::{
    ChainDirection, Direction, NotificationPriority, NotificationType, ProjectId, TaskId, UserId,
    ViolationState,
};
use crate::violation::{transition_event, ViolationDetector, ViolationReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusIssue {
    pub dependency_id: i64,
    pub predecessor_task_id: TaskId,
    pub message: String,
}

/// Whether a task may move to a status given its predecessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusValidation {
    pub valid: bool,
    pub violations: Vec<StatusIssue>,
    pub warnings: Vec<StatusIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDeletion {
    pub task_id: TaskId,
    pub removed_dependencies: Vec<i64>,
}

/// Dependency record store, violation tracking and event dispatch.
pub struct DependencyService {
    repos: Repositories,
    preferences: PreferenceService,
    policy: NotificationPolicy,
    detector: ViolationDetector,
    templates: Arc<TemplateRegistry>,
    include_dependency_creator: bool,
    clock: Arc<dyn Clock>,
}

impl DependencyService {
    pub fn new(repos: Repositories, notifications: &NotificationConfig, violations: &ViolationConfig) -> Self {
        Self {
            preferences: PreferenceService::new(repos.preferences.clone(), notifications.clone()),
            repos,
            policy: NotificationPolicy::new(notifications),
            detector: ViolationDetector::from_config(violations),
            templates: Arc::new(TemplateRegistry::new()),
            include_dependency_creator: notifications.include_dependency_creator,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateRegistry>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.preferences = self.preferences.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn preferences(&self) -> &PreferenceService {
        &self.preferences
    }

    async fn load_task(&self, id: TaskId) -> DependencyResult<Task> {
        self.repos
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| DependencyError::task_not_found(id))
    }

    async fn load_dependency(&self, id: i64) -> DependencyResult<TaskDependency> {
        self.repos
            .dependencies
            .find_by_id(id)
            .await?
            .ok_or_else(|| DependencyError::dependency_not_found(id))
    }

    async fn load_endpoints(&self, dependency: &TaskDependency) -> DependencyResult<(Task, Task)> {
        let predecessor = self.load_task(dependency.predecessor_task_id).await?;
        let successor = self.load_task(dependency.successor_task_id).await?;
        Ok((predecessor, successor))
    }

    fn event(&self, kind: NotificationType, dependency: &TaskDependency) -> DependencyEvent {
        DependencyEvent::new(
            kind,
            dependency.id,
            dependency.predecessor_task_id,
            dependency.successor_task_id,
            self.clock.now(),
        )
    }

    // ---- record store -------------------------------------------------

    #[instrument(skip(self, new), fields(
        predecessor = new.predecessor_task_id,
        successor = new.successor_task_id,
        dependency_type = %new.dependency_type,
    ))]
    pub async fn create_dependency(
        &self,
        new: NewDependency,
        actor: Option<UserId>,
    ) -> DependencyResult<TaskDependency> {
        if new.predecessor_task_id == new.successor_task_id {
            return Err(DependencyError::cyclic(
                new.predecessor_task_id,
                new.successor_task_id,
            ));
        }
        let predecessor = self.load_task(new.predecessor_task_id).await?;
        let successor = self.load_task(new.successor_task_id).await?;

        let mut dependency = TaskDependency::from_new(&new, actor, self.clock.now());
        dependency.violation_state = self
            .detector
            .evaluate(&dependency, &predecessor, &successor)
            .state;

        let created = self.repos.dependencies.create(&dependency).await?;
        info!(dependency_id = created.id, "dependency created");

        if new.notify {
            let event = self
                .event(NotificationType::DependencyCreated, &created)
                .with_data(serde_json::json!({ "createdBy": actor }));
            self.dispatch(event, &created, &predecessor, &successor).await;
            if let Some(kind) = transition_event(ViolationState::None, created.violation_state) {
                let event = self.event(kind, &created);
                self.dispatch(event, &created, &predecessor, &successor).await;
            }
        }
        Ok(created)
    }

    #[instrument(skip(self, update))]
    pub async fn update_dependency(
        &self,
        id: i64,
        update: DependencyUpdate,
        actor: Option<UserId>,
    ) -> DependencyResult<TaskDependency> {
        let mut dependency = self.load_dependency(id).await?;
        dependency.apply(&update, actor, self.clock.now())?;
        let (predecessor, successor) = self.load_endpoints(&dependency).await?;

        let report = self.detector.report(&dependency, &predecessor, &successor);
        dependency.violation_state = report.current;
        let updated = self.repos.dependencies.update(&dependency).await?;
        info!(dependency_id = id, is_active = updated.is_active, "dependency updated");

        let event = self
            .event(NotificationType::DependencyUpdated, &updated)
            .with_data(serde_json::json!({ "updatedBy": actor, "changes": update }));
        self.dispatch(event, &updated, &predecessor, &successor).await;
        // a switched-off edge drops its state without claiming resolution
        let state_event = if updated.is_active { report.event } else { None };
        if let Some(kind) = state_event {
            let event = self.event(kind, &updated);
            self.dispatch(event, &updated, &predecessor, &successor).await;
        }
        Ok(updated)
    }

    /// Hard delete. The removal notice outlives the record.
    #[instrument(skip(self))]
    pub async fn delete_dependency(&self, id: i64, actor: Option<UserId>) -> DependencyResult<TaskDependency> {
        let dependency = self.load_dependency(id).await?;
        let (predecessor, successor) = self.load_endpoints(&dependency).await?;

        if !self.repos.dependencies.delete(id).await? {
            return Err(DependencyError::dependency_not_found(id));
        }
        info!(dependency_id = id, "dependency deleted");

        let event = self
            .event(NotificationType::DependencyRemoved, &dependency)
            .with_data(serde_json::json!({ "removedBy": actor }));
        self.dispatch(event, &dependency, &predecessor, &successor).await;
        Ok(dependency)
    }

    /// Deleting a task removes every dependency that references it.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: TaskId) -> DependencyResult<TaskDeletion> {
        self.load_task(task_id).await?;
        let removed: Vec<i64> = self
            .repos
            .dependencies
            .find_for_task(task_id, Direction::Both, true)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();

        if !self.repos.tasks.delete(task_id).await? {
            return Err(DependencyError::task_not_found(task_id));
        }
        info!(task_id, removed = removed.len(), "task deleted with its dependencies");
        Ok(TaskDeletion {
            task_id,
            removed_dependencies: removed,
        })
    }

    // ---- queries ------------------------------------------------------

    pub async fn get_dependency(&self, id: i64) -> DependencyResult<TaskDependency> {
        self.load_dependency(id).await
    }

    pub async fn list_task_dependencies(
        &self,
        task_id: TaskId,
        direction: Direction,
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        self.load_task(task_id).await?;
        self.repos
            .dependencies
            .find_for_task(task_id, direction, include_inactive)
            .await
    }

    pub async fn list_project_dependencies(
        &self,
        project_id: ProjectId,
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        let task_ids: Vec<TaskId> = self
            .repos
            .tasks
            .find_by_project(project_id)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.repos
            .dependencies
            .find_for_tasks(&task_ids, include_inactive)
            .await
    }

    async fn active_graph(&self) -> DependencyResult<(DependencyGraph, Vec<TaskDependency>)> {
        let active = self.repos.dependencies.find_active().await?;
        Ok((DependencyGraph::from_dependencies(&active), active))
    }

    /// Every active dependency reachable from the task, transitively.
    pub async fn dependency_chain(
        &self,
        task_id: TaskId,
        direction: ChainDirection,
    ) -> DependencyResult<Vec<TaskDependency>> {
        self.load_task(task_id).await?;
        let (graph, active) = self.active_graph().await?;
        let mut by_id: HashMap<i64, TaskDependency> = active.into_iter().map(|d| (d.id, d)).collect();
        Ok(graph
            .chain(task_id, direction)
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect())
    }

    /// Whether adding `predecessor -> successor` would close a cycle.
    pub async fn check_circular(&self, predecessor: TaskId, successor: TaskId) -> DependencyResult<bool> {
        let (graph, _) = self.active_graph().await?;
        Ok(graph.would_create_cycle(predecessor, successor))
    }

    /// Project tasks in an order that respects every active dependency.
    pub async fn project_task_order(&self, project_id: ProjectId) -> DependencyResult<Vec<TaskId>> {
        let dependencies = self.list_project_dependencies(project_id, false).await?;
        let mut graph = DependencyGraph::from_dependencies(&dependencies);
        for task in self.repos.tasks.find_by_project(project_id).await? {
            // isolated tasks still need a node
            if graph.successors_of(task.id).is_empty() && graph.predecessors_of(task.id).is_empty() {
                graph.add_node(task.id);
            }
        }
        graph.topological_order()
    }

    // ---- violations ---------------------------------------------------

    /// Re-evaluates every active dependency touching the task, persists
    /// state changes and emits one event per transition.
    #[instrument(skip(self))]
    pub async fn check_violations_for_task(&self, task_id: TaskId) -> DependencyResult<Vec<ViolationReport>> {
        self.load_task(task_id).await?;
        let dependencies = self
            .repos
            .dependencies
            .find_for_task(task_id, Direction::Both, false)
            .await?;

        let mut reports = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let (predecessor, successor) = self.load_endpoints(&dependency).await?;
            let report = self.detector.report(&dependency, &predecessor, &successor);
            if report.changed() {
                self.repos
                    .dependencies
                    .set_violation_state(dependency.id, report.current)
                    .await?;
                info!(
                    dependency_id = dependency.id,
                    from = report.previous.as_str(),
                    to = report.current.as_str(),
                    "violation state changed"
                );
            }
            if let Some(kind) = report.event {
                let event = self.event(kind, &dependency).with_data(serde_json::json!({
                    "previousState": report.previous,
                    "currentState": report.current,
                    "requiredDate": report.required,
                    "actualDate": report.actual,
                }));
                self.dispatch(event, &dependency, &predecessor, &successor).await;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    pub async fn update_task_dates(
        &self,
        task_id: TaskId,
        start_date: Option<DateTime<Utc>>,
        due_date: Option<DateTime<Utc>>,
    ) -> DependencyResult<(Task, Vec<ViolationReport>)> {
        let mut task = self.load_task(task_id).await?;
        task.start_date = start_date;
        task.due_date = due_date;
        task.updated_at = self.clock.now();
        let task = self.repos.tasks.update(&task).await?;
        let reports = self.check_violations_for_task(task_id).await?;
        Ok((task, reports))
    }

    // ---- status -------------------------------------------------------

    /// Status gate plus date warnings for moving `task_id` to `new_status`.
    /// Only statuses that represent started work are gated.
    pub async fn validate_status_change(
        &self,
        task_id: TaskId,
        new_status: TaskStatus,
    ) -> DependencyResult<StatusValidation> {
        let task = self.load_task(task_id).await?;
        let incoming = self
            .repos
            .dependencies
            .find_for_task(task_id, Direction::Predecessors, false)
            .await?;

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        for dependency in incoming {
            let predecessor = self.load_task(dependency.predecessor_task_id).await?;
            if new_status.has_started() && !dependency.can_proceed(predecessor.status, new_status) {
                violations.push(StatusIssue {
                    dependency_id: dependency.id,
                    predecessor_task_id: predecessor.id,
                    message: format!(
                        "{} dependency on \"{}\" is not satisfied (status {})",
                        dependency.dependency_type.description(),
                        predecessor.title,
                        predecessor.status
                    ),
                });
            }
            let check = self.detector.evaluate(&dependency, &predecessor, &task);
            if check.state == ViolationState::Violation {
                warnings.push(StatusIssue {
                    dependency_id: dependency.id,
                    predecessor_task_id: predecessor.id,
                    message: format!(
                        "scheduled dates break the {} dependency on \"{}\"",
                        dependency.dependency_type.description(),
                        predecessor.title
                    ),
                });
            }
        }

        Ok(StatusValidation {
            valid: violations.is_empty(),
            violations,
            warnings,
        })
    }

    /// Records a status change and notifies the affected side of each
    /// dependency: successors hear about started or completed predecessors,
    /// and a task that starts while blocked raises `successor_blocked`.
    #[instrument(skip(self))]
    pub async fn task_status_changed(&self, task_id: TaskId, new_status: TaskStatus) -> DependencyResult<Task> {
        let mut task = self.load_task(task_id).await?;
        let previous = task.status;
        if previous == new_status {
            return Ok(task);
        }
        task.status = new_status;
        task.updated_at = self.clock.now();
        let task = self.repos.tasks.update(&task).await?;
        info!(task_id, from = %previous, to = %new_status, "task status changed");

        let outgoing = self
            .repos
            .dependencies
            .find_for_task(task_id, Direction::Successors, false)
            .await?;
        for dependency in outgoing {
            let successor = self.load_task(dependency.successor_task_id).await?;
            let kind = match new_status {
                TaskStatus::Completed => Some(NotificationType::PredecessorCompleted),
                TaskStatus::InProgress if !previous.has_started() => Some(NotificationType::PredecessorStarted),
                _ => None,
            };
            if let Some(kind) = kind {
                let event = self.event(kind, &dependency);
                self.dispatch(event, &dependency, &task, &successor).await;
            }

            let was_blocking = !dependency.can_proceed(previous, TaskStatus::InProgress);
            let now_clear = dependency.can_proceed(new_status, TaskStatus::InProgress);
            if was_blocking && now_clear && self.all_predecessors_satisfied(&successor).await? {
                let event = self.event(NotificationType::SuccessorUnblocked, &dependency);
                self.dispatch(event, &dependency, &task, &successor).await;
            }
        }

        if new_status.has_started() {
            let incoming = self
                .repos
                .dependencies
                .find_for_task(task_id, Direction::Predecessors, false)
                .await?;
            for dependency in incoming {
                let predecessor = self.load_task(dependency.predecessor_task_id).await?;
                if !dependency.can_proceed(predecessor.status, new_status) {
                    warn!(task_id, dependency_id = dependency.id, "task started while blocked");
                    let event = self.event(NotificationType::SuccessorBlocked, &dependency);
                    self.dispatch(event, &dependency, &predecessor, &task).await;
                }
            }
        }

        Ok(task)
    }

    async fn all_predecessors_satisfied(&self, successor: &Task) -> DependencyResult<bool> {
        let incoming = self
            .repos
            .dependencies
            .find_for_task(successor.id, Direction::Predecessors, false)
            .await?;
        for dependency in incoming {
            let predecessor = self.load_task(dependency.predecessor_task_id).await?;
            if !dependency.can_proceed(predecessor.status, TaskStatus::InProgress) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ---- deadlines ----------------------------------------------------

    /// Warns successors' people about open predecessors due soon. Each user
    /// is told at most once per predecessor due date.
    #[instrument(skip(self))]
    pub async fn check_deadlines(&self, now: DateTime<Utc>) -> DependencyResult<Vec<DependencyNotification>> {
        let mut sent = Vec::new();
        for mut dependency in self.repos.dependencies.find_active().await? {
            let predecessor = self.load_task(dependency.predecessor_task_id).await?;
            if matches!(predecessor.status, TaskStatus::Completed | TaskStatus::Cancelled) {
                continue;
            }
            let Some(due) = predecessor.due_date else {
                continue;
            };
            let remaining = due - now;
            if remaining < chrono::Duration::zero() {
                continue;
            }
            let successor = self.load_task(dependency.successor_task_id).await?;

            let marker = due.to_rfc3339();
            let mut notified = dependency
                .metadata
                .get("deadlineNotified")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            let event = DependencyEvent::new(
                NotificationType::DependencyDeadlineApproaching,
                dependency.id,
                dependency.predecessor_task_id,
                dependency.successor_task_id,
                now,
            )
            .with_data(serde_json::json!({
                "dueDate": due,
                "hoursRemaining": remaining.num_hours(),
            }));

            let priority_for = |preference: &NotificationPreference| {
                let already = notified
                    .get(&preference.user_id.to_string())
                    .and_then(|v| v.as_str())
                    == Some(marker.as_str());
                if already {
                    None
                } else {
                    NotificationPolicy::deadline_priority(&preference.thresholds, remaining)
                }
            };
            let created = match self
                .notify_with(&event, &dependency, &predecessor, &successor, priority_for)
                .await
            {
                Ok(created) => created,
                Err(err) => {
                    warn!(dependency_id = dependency.id, error = %err, "deadline notification failed");
                    continue;
                }
            };
            if created.is_empty() {
                continue;
            }

            for recipient in created.iter().flat_map(|n| n.recipients.iter()) {
                notified.insert(recipient.user_id.to_string(), serde_json::json!(marker));
            }
            if !dependency.metadata.is_object() {
                dependency.metadata = serde_json::json!({});
            }
            if let Some(map) = dependency.metadata.as_object_mut() {
                map.insert("deadlineNotified".to_string(), serde_json::Value::Object(notified));
            }
            self.repos.dependencies.update(&dependency).await?;
            sent.extend(created);
        }
        debug!(count = sent.len(), "deadline scan finished");
        Ok(sent)
    }

    // ---- dispatch -----------------------------------------------------

    /// Notification failures never fail the mutation that caused them.
    async fn dispatch(
        &self,
        event: DependencyEvent,
        dependency: &TaskDependency,
        predecessor: &Task,
        successor: &Task,
    ) -> Vec<DependencyNotification> {
        let priority = event.priority;
        match self
            .notify_with(&event, dependency, predecessor, successor, |_| Some(priority))
            .await
        {
            Ok(created) => created,
            Err(err) => {
                warn!(
                    dependency_id = dependency.id,
                    event = event.kind.as_str(),
                    error = %err,
                    "failed to queue dependency notification"
                );
                Vec::new()
            }
        }
    }

    /// Plans and stores one pending notification per qualifying recipient.
    pub async fn notify_with<F>(
        &self,
        event: &DependencyEvent,
        dependency: &TaskDependency,
        predecessor: &Task,
        successor: &Task,
        priority_for: F,
    ) -> DependencyResult<Vec<DependencyNotification>>
    where
        F: Fn(&NotificationPreference) -> Option<NotificationPriority> + Send + Sync,
    {
        let project_id = successor.project_id.or(predecessor.project_id);
        let candidates = collect_recipients(
            dependency,
            predecessor,
            successor,
            self.include_dependency_creator,
        );

        let mut contexts = Vec::with_capacity(candidates.len());
        for (user_id, role) in candidates {
            let preference = self.preferences.effective(user_id, project_id).await?;
            contexts.push(RecipientContext {
                user_id,
                role,
                preference,
            });
        }

        let plans = self
            .policy
            .plan(event.kind, &contexts, event.occurred_at, priority_for);
        if plans.is_empty() {
            debug!(event = event.kind.as_str(), dependency_id = dependency.id, "no recipients accept this event");
            return Ok(Vec::new());
        }

        let content = self
            .templates
            .render(event.kind, dependency, predecessor, successor, &event.data);
        let mut created = Vec::with_capacity(plans.len());
        for plan in plans {
            let notification = DependencyNotification::pending(
                dependency.id,
                event.kind,
                plan.priority,
                content.clone(),
                vec![plan.recipient],
                event.occurred_at,
            )
            .scheduled_for(plan.delivery.scheduled_at());
            created.push(self.repos.notifications.create(&notification).await?);
        }
        debug!(
            event = event.kind.as_str(),
            dependency_id = dependency.id,
            count = created.len(),
            "dependency notifications queued"
        );
        Ok(created)
    }
}
