//! Notification template registry
//!
//! Templates use `{placeholder}` substitution. Known placeholders are
//! `{predecessor}`, `{successor}`, `{type}`, `{type_description}` and `{lag}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entities::{Task, TaskDependency};
use crate::value_objects::{NotificationContent, NotificationType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Registry of notification templates keyed by event type, with a generic
/// fallback for anything unregistered.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<NotificationType, Template>,
    fallback: Template,
}

impl TemplateRegistry {
    /// Create a registry with all built-in templates
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for (notification_type, subject, body) in BUILT_IN {
            registry.register(*notification_type, Template::new(*subject, *body));
        }
        registry
    }

    /// Create a registry that only knows the fallback
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            fallback: Template::new("Task Dependency Update", "A task dependency has been updated."),
        }
    }

    /// Register or replace the template for one event type
    pub fn register(&mut self, notification_type: NotificationType, template: Template) {
        self.templates.insert(notification_type, template);
    }

    pub fn get(&self, notification_type: NotificationType) -> Option<&Template> {
        self.templates.get(&notification_type)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn render(
        &self,
        notification_type: NotificationType,
        dependency: &TaskDependency,
        predecessor: &Task,
        successor: &Task,
        extra: &serde_json::Value,
    ) -> NotificationContent {
        let template = self.get(notification_type).unwrap_or(&self.fallback);
        let lag = dependency.lag_time.to_string();
        let substitutions = [
            ("{predecessor}", predecessor.title.as_str()),
            ("{successor}", successor.title.as_str()),
            ("{type}", dependency.dependency_type.as_str()),
            ("{type_description}", dependency.dependency_type.description()),
            ("{lag}", lag.as_str()),
        ];
        let fill = |text: &str| {
            substitutions
                .iter()
                .fold(text.to_string(), |acc, (key, value)| acc.replace(key, value))
        };

        let mut data = serde_json::json!({
            "dependency": {
                "id": dependency.id,
                "type": dependency.dependency_type,
                "lagTime": dependency.lag_time,
            },
            "predecessorTask": {
                "id": predecessor.id,
                "title": predecessor.title,
                "status": predecessor.status,
            },
            "successorTask": {
                "id": successor.id,
                "title": successor.title,
                "status": successor.status,
            },
        });
        if let (Some(target), Some(source)) = (data.as_object_mut(), extra.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }

        NotificationContent {
            subject: fill(&template.subject),
            body: fill(&template.body),
            data,
        }
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const BUILT_IN: &[(NotificationType, &str, &str)] = &[
    (
        NotificationType::DependencyCreated,
        "New Task Dependency Created",
        "A new {type} dependency has been created between \"{predecessor}\" and \"{successor}\".",
    ),
    (
        NotificationType::DependencyUpdated,
        "Task Dependency Updated",
        "The {type} dependency between \"{predecessor}\" and \"{successor}\" has been updated.",
    ),
    (
        NotificationType::DependencyRemoved,
        "Task Dependency Removed",
        "The dependency between \"{predecessor}\" and \"{successor}\" has been removed.",
    ),
    (
        NotificationType::DependencyViolation,
        "Task Dependency Violation",
        "The dependency between \"{predecessor}\" and \"{successor}\" has been violated.",
    ),
    (
        NotificationType::DependencyWarning,
        "Task Dependency At Risk",
        "The {type_description} dependency between \"{predecessor}\" and \"{successor}\" is close to being violated.",
    ),
    (
        NotificationType::DependencyResolved,
        "Task Dependency Resolved",
        "The dependency between \"{predecessor}\" and \"{successor}\" is satisfied again.",
    ),
    (
        NotificationType::PredecessorStarted,
        "Predecessor Task Started",
        "Task \"{predecessor}\" has started, which affects \"{successor}\".",
    ),
    (
        NotificationType::PredecessorCompleted,
        "Predecessor Task Completed",
        "Task \"{predecessor}\" has been completed. You can now proceed with \"{successor}\".",
    ),
    (
        NotificationType::SuccessorBlocked,
        "Task Blocked By Dependency",
        "Task \"{successor}\" is blocked until \"{predecessor}\" satisfies its {type} dependency.",
    ),
    (
        NotificationType::SuccessorUnblocked,
        "Task Unblocked",
        "All dependencies of \"{successor}\" are satisfied. It can now proceed.",
    ),
    (
        NotificationType::DependencyDeadlineApproaching,
        "Dependency Deadline Warning",
        "The deadline for task \"{predecessor}\" is approaching, which may affect \"{successor}\".",
    ),
    (
        NotificationType::CriticalPathChange,
        "Critical Path Changed",
        "The critical path through \"{predecessor}\" and \"{successor}\" has changed.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NewDependency;
    use crate::value_objects::DependencyType;
    use chrono::Utc;

    fn fixtures() -> (TaskDependency, Task, Task) {
        let mut dep = TaskDependency::from_new(
            &NewDependency::new(1, 2)
                .with_type(DependencyType::StartToStart)
                .with_lag(4),
            None,
            Utc::now(),
        );
        dep.id = 42;
        let mut pred = Task::new("Design");
        pred.id = 1;
        let mut succ = Task::new("Build");
        succ.id = 2;
        (dep, pred, succ)
    }

    #[test]
    fn test_builtin_registry_covers_every_type() {
        let registry = TemplateRegistry::new();
        assert_eq!(registry.len(), NotificationType::ALL.len());
        for t in NotificationType::ALL {
            assert!(registry.get(t).is_some(), "missing template for {t}");
        }
    }

    #[test]
    fn test_render_substitutes_and_builds_data() {
        let (dep, pred, succ) = fixtures();
        let content = TemplateRegistry::new().render(
            NotificationType::DependencyCreated,
            &dep,
            &pred,
            &succ,
            &serde_json::json!({ "actor": 9 }),
        );
        assert_eq!(content.subject, "New Task Dependency Created");
        assert_eq!(
            content.body,
            "A new SS dependency has been created between \"Design\" and \"Build\"."
        );
        assert_eq!(content.data["dependency"]["id"], 42);
        assert_eq!(content.data["dependency"]["type"], "SS");
        assert_eq!(content.data["successorTask"]["title"], "Build");
        assert_eq!(content.data["actor"], 9);
    }

    #[test]
    fn test_empty_registry_uses_fallback() {
        let (dep, pred, succ) = fixtures();
        let registry = TemplateRegistry::empty();
        assert!(registry.is_empty());
        let content = registry.render(
            NotificationType::DependencyViolation,
            &dep,
            &pred,
            &succ,
            &serde_json::Value::Null,
        );
        assert_eq!(content.subject, "Task Dependency Update");
    }

    #[test]
    fn test_register_overrides_template() {
        let (dep, pred, succ) = fixtures();
        let mut registry = TemplateRegistry::new();
        registry.register(
            NotificationType::DependencyCreated,
            Template::new("Linked {predecessor}", "lag {lag}h"),
        );
        let content = registry.render(
            NotificationType::DependencyCreated,
            &dep,
            &pred,
            &succ,
            &serde_json::Value::Null,
        );
        assert_eq!(content.subject, "Linked Design");
        assert_eq!(content.body, "lag 4h");
    }
}
