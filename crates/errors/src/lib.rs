use thiserror::Error;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },
    #[error("依赖关系未找到: {id}")]
    DependencyNotFound { id: i64 },
    #[error("通知未找到: {id}")]
    NotificationNotFound { id: i64 },
    #[error("通知偏好未找到: 用户 {user_id}, 项目 {project_id:?}")]
    PreferenceNotFound {
        user_id: i64,
        project_id: Option<i64>,
    },
    #[error("依赖关系已存在: {predecessor_id} -> {successor_id} ({dependency_type})")]
    DuplicateDependency {
        predecessor_id: i64,
        successor_id: i64,
        dependency_type: String,
    },
    #[error("检测到循环依赖: {predecessor_id} -> {successor_id}")]
    CyclicDependency {
        predecessor_id: i64,
        successor_id: i64,
    },
    #[error("无效的依赖类型: {0}")]
    InvalidDependencyType(String),
    #[error("依赖关系 {id} 的前置/后续任务不可修改")]
    ImmutableEndpoints { id: i64 },
    #[error("无效的通知状态转换: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("通知投递失败: {0}")]
    Delivery(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DependencyResult<T> = Result<T, DependencyError>;

impl DependencyError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn dependency_not_found(id: i64) -> Self {
        Self::DependencyNotFound { id }
    }
    pub fn notification_not_found(id: i64) -> Self {
        Self::NotificationNotFound { id }
    }
    pub fn duplicate<S: Into<String>>(predecessor_id: i64, successor_id: i64, dependency_type: S) -> Self {
        Self::DuplicateDependency {
            predecessor_id,
            successor_id,
            dependency_type: dependency_type.into(),
        }
    }
    pub fn cyclic(predecessor_id: i64, successor_id: i64) -> Self {
        Self::CyclicDependency {
            predecessor_id,
            successor_id,
        }
    }
    pub fn invalid_transition<F: Into<String>, T: Into<String>>(from: F, to: T) -> Self {
        Self::InvalidStatusTransition {
            from: from.into(),
            to: to.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn delivery_error<S: Into<String>>(msg: S) -> Self {
        Self::Delivery(msg.into())
    }

    /// Validation failures are never retried; only transient persistence and
    /// delivery faults are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DependencyError::DatabaseOperation(_) | DependencyError::Delivery(_)
        )
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// HTTP status an outer transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            DependencyError::TaskNotFound { .. }
            | DependencyError::DependencyNotFound { .. }
            | DependencyError::NotificationNotFound { .. }
            | DependencyError::PreferenceNotFound { .. } => 404,
            DependencyError::DuplicateDependency { .. } | DependencyError::CyclicDependency { .. } => 409,
            DependencyError::InvalidDependencyType(_)
            | DependencyError::ImmutableEndpoints { .. }
            | DependencyError::InvalidStatusTransition { .. }
            | DependencyError::Validation(_) => 422,
            _ => 500,
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            DependencyError::TaskNotFound { .. } => "请求的任务不存在",
            DependencyError::DependencyNotFound { .. } => "请求的依赖关系不存在",
            DependencyError::NotificationNotFound { .. } => "请求的通知不存在",
            DependencyError::DuplicateDependency { .. } => "相同的依赖关系已存在",
            DependencyError::CyclicDependency { .. } => "该依赖关系会形成循环",
            DependencyError::InvalidDependencyType(_) => "依赖类型必须是 FS、SS、FF 或 SF",
            DependencyError::ImmutableEndpoints { .. } => "依赖关系的任务不能被修改",
            DependencyError::Validation(_) => "输入数据验证失败",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for DependencyError {
    fn from(err: serde_json::Error) -> Self {
        DependencyError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DependencyError {
    fn from(err: anyhow::Error) -> Self {
        DependencyError::Internal(err.to_string())
    }
}
