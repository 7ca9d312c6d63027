//! Error handling for repository operations with rich context
//!
//! Every sqlx failure is turned into a [`DependencyError`] that names the
//! operation and the entity involved, and is logged once at the point of
//! conversion.

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use taskdeps_domain::TaskDependency;
use taskdeps_errors::DependencyError;
use tracing::{error, instrument, warn};

/// Operation context for repository operations
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Delete,
    Query,
    BatchRead,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::BatchRead => write!(f, "批量查询"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
        }
    }
}

/// Which table an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Dependency,
    Notification,
    Preference,
    NotificationLog,
    Schema,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Task => write!(f, "任务"),
            EntityKind::Dependency => write!(f, "依赖关系"),
            EntityKind::Notification => write!(f, "依赖通知"),
            EntityKind::Preference => write!(f, "通知偏好"),
            EntityKind::NotificationLog => write!(f, "投递日志"),
            EntityKind::Schema => write!(f, "数据库结构"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: RepositoryOperation,
    pub entity: EntityKind,
    pub entity_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl OperationContext {
    pub fn new(operation: RepositoryOperation, entity: EntityKind) -> Self {
        Self {
            operation,
            entity,
            entity_id: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn with_additional_info(mut self, info: String) -> Self {
        self.additional_info = Some(info);
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.entity_id, &self.additional_info) {
            (Some(id), Some(info)) => format!("{} (ID: {}, {})", self.entity, id, info),
            (Some(id), None) => format!("{} (ID: {})", self.entity, id),
            (None, Some(info)) => format!("{} ({})", self.entity, info),
            (None, None) => self.entity.to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// Generic sqlx failure with context.
    #[instrument(skip_all, fields(
        operation = %context.operation,
        entity = %context.entity,
        entity_id = ?context.entity_id,
        timestamp = %context.timestamp,
    ))]
    pub fn database_error(context: OperationContext, error: SqlxError) -> DependencyError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        let error_msg = match &error {
            SqlxError::Database(db_error) => {
                if db_error.is_foreign_key_violation() {
                    let msg = format!("{operation_desc}{entity_desc}时发生外键约束冲突: 关联的任务不存在");
                    warn!(error = %error, "{}", msg);
                    return DependencyError::validation_error(msg);
                }
                if db_error.is_unique_violation() {
                    format!("{operation_desc}{entity_desc}时发生唯一约束冲突: {db_error}")
                } else {
                    format!("{operation_desc}{entity_desc}时发生数据库错误: {db_error}")
                }
            }
            SqlxError::RowNotFound => {
                format!("{operation_desc}{entity_desc}时未找到记录")
            }
            SqlxError::PoolClosed => {
                format!("{operation_desc}{entity_desc}时数据库连接池已关闭")
            }
            SqlxError::PoolTimedOut => {
                format!("{operation_desc}{entity_desc}时数据库连接池超时")
            }
            SqlxError::Io(io_error) => {
                format!("{operation_desc}{entity_desc}时发生I/O错误: {io_error}")
            }
            _ => {
                format!("{operation_desc}{entity_desc}时发生未知数据库错误: {error}")
            }
        };

        error!(error = %error, "{}", error_msg);
        DependencyError::database_error(error_msg)
    }

    /// Like [`Self::database_error`], but a unique violation on the
    /// (predecessor, successor, type) index becomes `DuplicateDependency`.
    pub fn dependency_database_error(
        context: OperationContext,
        dependency: &TaskDependency,
        error: SqlxError,
    ) -> DependencyError {
        if let SqlxError::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                warn!(
                    predecessor = dependency.predecessor_task_id,
                    successor = dependency.successor_task_id,
                    dependency_type = %dependency.dependency_type,
                    "duplicate dependency rejected by unique index"
                );
                return DependencyError::duplicate(
                    dependency.predecessor_task_id,
                    dependency.successor_task_id,
                    dependency.dependency_type.as_str(),
                );
            }
        }
        Self::database_error(context, error)
    }

    pub fn serialization_error(context: OperationContext, error: impl fmt::Display) -> DependencyError {
        let error_msg = format!(
            "{}{}时序列化失败: {}",
            context.operation,
            context.entity_description(),
            error
        );
        error!(error = %error, "{}", error_msg);
        DependencyError::Serialization(error_msg)
    }
}

#[macro_export]
macro_rules! op_context {
    ($operation:expr, $entity:expr) => {
        $crate::error_handling::OperationContext::new($operation, $entity)
    };
    ($operation:expr, $entity:expr, id = $id:expr) => {
        $crate::error_handling::OperationContext::new($operation, $entity).with_id($id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_description() {
        let ctx = OperationContext::new(RepositoryOperation::Read, EntityKind::Dependency).with_id(7);
        assert_eq!(ctx.entity_description(), "依赖关系 (ID: 7)");

        let ctx = OperationContext::new(RepositoryOperation::BatchRead, EntityKind::Task)
            .with_additional_info("3个任务".to_string());
        assert_eq!(ctx.entity_description(), "任务 (3个任务)");
    }

    #[test]
    fn test_pool_closed_maps_to_database_operation() {
        let ctx = op_context!(RepositoryOperation::Create, EntityKind::Notification);
        let err = RepositoryErrorHelpers::database_error(ctx, SqlxError::PoolClosed);
        match err {
            DependencyError::DatabaseOperation(msg) => assert!(msg.contains("连接池已关闭")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
