pub mod clock;
pub mod delivery;
pub mod entities;
pub mod events;
pub mod graph;
pub mod policy;
pub mod preferences;
pub mod repositories;
pub mod rules;
pub mod task_dependency_service;
pub mod templates;
pub mod value_objects;
pub mod violation;

// SQLx 实现（仅在启用 sqlx-support feature 时编译）
#[cfg(feature = "sqlx-support")]
pub mod sqlx_impls;

pub use clock::*;
pub use delivery::*;
pub use entities::*;
pub use events::*;
pub use graph::DependencyGraph;
pub use policy::*;
pub use preferences::PreferenceService;
pub use repositories::*;
pub use rules::{ConstraintCheck, ScheduleWindow};
pub use task_dependency_service::*;
pub use taskdeps_errors::{DependencyError, DependencyResult};
pub use templates::{Template, TemplateRegistry};
pub use value_objects::*;
pub use violation::{ViolationDetector, ViolationReport};
