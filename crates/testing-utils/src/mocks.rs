//! Mock implementations for all repository traits
//!
//! In-memory stores that enforce the same rules as the SQLite repositories:
//! unique (predecessor, successor, type) triples, acyclic active edges and
//! cascade removal of dependencies when a task goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskdeps_domain::{
    DependencyGraph, DependencyNotification, DependencyRepository, Direction, LogQuery,
    NotificationLog, NotificationLogRepository, NotificationPreference, NotificationRepository,
    NotificationStatus, Page, PreferenceRepository, ProjectId, Repositories, Task, TaskDependency,
    TaskId, TaskRepository, UserId, ViolationState,
};
use taskdeps_errors::{DependencyError, DependencyResult};

fn paginate<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset.max(0)).unwrap_or(0);
    let limit = usize::try_from(limit.max(0)).unwrap_or(0);
    items.iter().skip(offset).take(limit).cloned().collect()
}

/// Mock implementation of DependencyRepository for testing
#[derive(Debug, Clone)]
pub struct MockDependencyRepository {
    dependencies: Arc<Mutex<HashMap<i64, TaskDependency>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockDependencyRepository {
    pub fn new() -> Self {
        Self {
            dependencies: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.dependencies.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<TaskDependency> {
        let mut all: Vec<TaskDependency> = self.dependencies.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|d| d.id);
        all
    }

    /// Cascade used by [`MockTaskRepository::delete`].
    pub fn remove_for_task(&self, task_id: TaskId) -> usize {
        let mut dependencies = self.dependencies.lock().unwrap();
        let before = dependencies.len();
        dependencies.retain(|_, d| !d.involves(task_id));
        before - dependencies.len()
    }

    fn check_constraints(
        dependencies: &HashMap<i64, TaskDependency>,
        candidate: &TaskDependency,
    ) -> DependencyResult<()> {
        if candidate.is_active {
            let graph = DependencyGraph::from_dependencies(
                dependencies.values().filter(|d| d.id != candidate.id),
            );
            graph.ensure_acyclic_insert(candidate.predecessor_task_id, candidate.successor_task_id)?;
        }
        let duplicate = dependencies.values().any(|d| {
            d.id != candidate.id
                && d.predecessor_task_id == candidate.predecessor_task_id
                && d.successor_task_id == candidate.successor_task_id
                && d.dependency_type == candidate.dependency_type
        });
        if duplicate {
            return Err(DependencyError::duplicate(
                candidate.predecessor_task_id,
                candidate.successor_task_id,
                candidate.dependency_type.as_str(),
            ));
        }
        Ok(())
    }

    fn sorted(mut items: Vec<TaskDependency>) -> Vec<TaskDependency> {
        items.sort_by_key(|d| d.id);
        items
    }
}

impl Default for MockDependencyRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DependencyRepository for MockDependencyRepository {
    async fn create(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let mut dependencies = self.dependencies.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = dependency.clone();
        created.id = 0;
        Self::check_constraints(&dependencies, &created)?;
        created.id = *next_id;
        *next_id += 1;

        dependencies.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<TaskDependency>> {
        Ok(self.dependencies.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let mut dependencies = self.dependencies.lock().unwrap();
        if !dependencies.contains_key(&dependency.id) {
            return Err(DependencyError::dependency_not_found(dependency.id));
        }
        Self::check_constraints(&dependencies, dependency)?;
        dependencies.insert(dependency.id, dependency.clone());
        Ok(dependency.clone())
    }

    async fn delete(&self, id: i64) -> DependencyResult<bool> {
        Ok(self.dependencies.lock().unwrap().remove(&id).is_some())
    }

    async fn find_for_task(
        &self,
        task_id: TaskId,
        direction: Direction,
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        let dependencies = self.dependencies.lock().unwrap();
        let found = dependencies
            .values()
            .filter(|d| include_inactive || d.is_active)
            .filter(|d| match direction {
                Direction::Predecessors => d.successor_task_id == task_id,
                Direction::Successors => d.predecessor_task_id == task_id,
                Direction::Both => d.involves(task_id),
            })
            .cloned()
            .collect();
        Ok(Self::sorted(found))
    }

    async fn find_for_tasks(
        &self,
        task_ids: &[TaskId],
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        let dependencies = self.dependencies.lock().unwrap();
        let found = dependencies
            .values()
            .filter(|d| include_inactive || d.is_active)
            .filter(|d| {
                task_ids.contains(&d.predecessor_task_id) || task_ids.contains(&d.successor_task_id)
            })
            .cloned()
            .collect();
        Ok(Self::sorted(found))
    }

    async fn find_active(&self) -> DependencyResult<Vec<TaskDependency>> {
        let dependencies = self.dependencies.lock().unwrap();
        Ok(Self::sorted(
            dependencies.values().filter(|d| d.is_active).cloned().collect(),
        ))
    }

    async fn set_violation_state(&self, id: i64, state: ViolationState) -> DependencyResult<()> {
        let mut dependencies = self.dependencies.lock().unwrap();
        let dependency = dependencies
            .get_mut(&id)
            .ok_or_else(|| DependencyError::dependency_not_found(id))?;
        dependency.violation_state = state;
        Ok(())
    }
}

/// Mock implementation of TaskRepository for testing
#[derive(Debug, Clone)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<i64, Task>>>,
    next_id: Arc<Mutex<i64>>,
    dependencies: Option<MockDependencyRepository>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            dependencies: None,
        }
    }

    /// Deleting a task will cascade into `dependencies`.
    pub fn with_dependencies(mut self, dependencies: MockDependencyRepository) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get_all_tasks(&self) -> Vec<Task> {
        let mut all: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|t| t.id);
        all
    }
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: &Task) -> DependencyResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_task = task.clone();
        new_task.id = *next_id;
        *next_id += 1;

        tasks.insert(new_task.id, new_task.clone());
        Ok(new_task)
    }

    async fn find_by_id(&self, id: TaskId) -> DependencyResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[TaskId]) -> DependencyResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(ids.iter().filter_map(|id| tasks.get(id).cloned()).collect())
    }

    async fn find_by_project(&self, project_id: ProjectId) -> DependencyResult<Vec<Task>> {
        let mut found: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.project_id == Some(project_id))
            .cloned()
            .collect();
        found.sort_by_key(|t| t.id);
        Ok(found)
    }

    async fn update(&self, task: &Task) -> DependencyResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(DependencyError::task_not_found(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn delete(&self, id: TaskId) -> DependencyResult<bool> {
        let removed = self.tasks.lock().unwrap().remove(&id).is_some();
        if removed {
            if let Some(dependencies) = &self.dependencies {
                dependencies.remove_for_task(id);
            }
        }
        Ok(removed)
    }
}

/// Mock implementation of NotificationRepository for testing
#[derive(Debug, Clone)]
pub struct MockNotificationRepository {
    notifications: Arc<Mutex<HashMap<i64, DependencyNotification>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockNotificationRepository {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<DependencyNotification> {
        let mut all: Vec<DependencyNotification> =
            self.notifications.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|n| n.id);
        all
    }
}

impl Default for MockNotificationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationRepository for MockNotificationRepository {
    async fn create(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification> {
        let mut notifications = self.notifications.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = notification.clone();
        created.id = *next_id;
        *next_id += 1;

        notifications.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<DependencyNotification>> {
        Ok(self.notifications.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification> {
        let mut notifications = self.notifications.lock().unwrap();
        if !notifications.contains_key(&notification.id) {
            return Err(DependencyError::notification_not_found(notification.id));
        }
        notifications.insert(notification.id, notification.clone());
        Ok(notification.clone())
    }

    async fn claim(&self, notification: &DependencyNotification) -> DependencyResult<Option<DependencyNotification>> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications.get(&notification.id) {
            None => Err(DependencyError::notification_not_found(notification.id)),
            Some(stored) if stored.status != NotificationStatus::Pending => Ok(None),
            Some(_) => {
                notifications.insert(notification.id, notification.clone());
                Ok(Some(notification.clone()))
            }
        }
    }

    async fn find_by_dependency(
        &self,
        dependency_id: i64,
        limit: i64,
        offset: i64,
    ) -> DependencyResult<Page<DependencyNotification>> {
        let mut found: Vec<DependencyNotification> = self
            .notifications
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.dependency_id == dependency_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page {
            total: found.len() as i64,
            items: paginate(&found, limit, offset),
        })
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> DependencyResult<Vec<DependencyNotification>> {
        let mut due: Vec<DependencyNotification> = self
            .notifications
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.status == NotificationStatus::Pending && n.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(paginate(&due, limit, 0))
    }
}

/// Mock implementation of PreferenceRepository for testing
#[derive(Debug, Clone)]
pub struct MockPreferenceRepository {
    preferences: Arc<Mutex<HashMap<(UserId, Option<ProjectId>), NotificationPreference>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockPreferenceRepository {
    pub fn new() -> Self {
        Self {
            preferences: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.preferences.lock().unwrap().len()
    }
}

impl Default for MockPreferenceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceRepository for MockPreferenceRepository {
    async fn find(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> DependencyResult<Option<NotificationPreference>> {
        Ok(self
            .preferences
            .lock()
            .unwrap()
            .get(&(user_id, project_id))
            .cloned())
    }

    async fn upsert(&self, preference: &NotificationPreference) -> DependencyResult<NotificationPreference> {
        let mut preferences = self.preferences.lock().unwrap();
        let key = (preference.user_id, preference.project_id);
        let mut saved = preference.clone();
        saved.id = match preferences.get(&key) {
            Some(existing) => existing.id,
            None => {
                let mut next_id = self.next_id.lock().unwrap();
                let id = *next_id;
                *next_id += 1;
                id
            }
        };
        preferences.insert(key, saved.clone());
        Ok(saved)
    }
}

/// Mock implementation of NotificationLogRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockNotificationLogRepository {
    logs: Arc<Mutex<Vec<NotificationLog>>>,
}

impl MockNotificationLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<NotificationLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationLogRepository for MockNotificationLogRepository {
    async fn append(&self, log: &NotificationLog) -> DependencyResult<NotificationLog> {
        let mut logs = self.logs.lock().unwrap();
        let mut appended = log.clone();
        appended.id = logs.len() as i64 + 1;
        logs.push(appended.clone());
        Ok(appended)
    }

    async fn find_by_notification(&self, notification_id: i64) -> DependencyResult<Vec<NotificationLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.notification_id == notification_id)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: UserId, query: &LogQuery) -> DependencyResult<Page<NotificationLog>> {
        let mut found: Vec<NotificationLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.user_id == user_id && query.matches(l))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page {
            total: found.len() as i64,
            items: paginate(&found, query.limit, query.offset),
        })
    }
}

/// A linked set of mocks plus typed handles for assertions.
#[derive(Debug, Clone)]
pub struct MockRepositories {
    pub tasks: MockTaskRepository,
    pub dependencies: MockDependencyRepository,
    pub notifications: MockNotificationRepository,
    pub preferences: MockPreferenceRepository,
    pub logs: MockNotificationLogRepository,
}

impl MockRepositories {
    pub fn new() -> Self {
        let dependencies = MockDependencyRepository::new();
        Self {
            tasks: MockTaskRepository::new().with_dependencies(dependencies.clone()),
            dependencies,
            notifications: MockNotificationRepository::new(),
            preferences: MockPreferenceRepository::new(),
            logs: MockNotificationLogRepository::new(),
        }
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            tasks: Arc::new(self.tasks.clone()),
            dependencies: Arc::new(self.dependencies.clone()),
            notifications: Arc::new(self.notifications.clone()),
            preferences: Arc::new(self.preferences.clone()),
            logs: Arc::new(self.logs.clone()),
        }
    }
}

impl Default for MockRepositories {
    fn default() -> Self {
        Self::new()
    }
}
