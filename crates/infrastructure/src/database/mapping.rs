//! Shared row mapping helpers
//!
//! Structured columns (lists, toggles, metadata) are stored as JSON text.

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use taskdeps_errors::{DependencyError, DependencyResult};

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn parse_json_sqlite<T: DeserializeOwned>(row: &SqliteRow, field_name: &str) -> DependencyResult<T> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str)
            .map_err(|e| DependencyError::Serialization(format!("解析字段 {field_name} 失败: {e}")))
    }

    pub fn parse_optional_json_sqlite<T: DeserializeOwned>(
        row: &SqliteRow,
        field_name: &str,
    ) -> DependencyResult<Option<T>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) => serde_json::from_str(&json_str)
                .map(Some)
                .map_err(|e| DependencyError::Serialization(format!("解析字段 {field_name} 失败: {e}"))),
            None => Ok(None),
        }
    }

    pub fn to_json<T: Serialize>(value: &T) -> DependencyResult<String> {
        serde_json::to_string(value).map_err(|e| DependencyError::Serialization(format!("序列化失败: {e}")))
    }

    /// `?1, ?2, ...` for an `IN` clause starting at `first`.
    pub fn placeholders(first: usize, count: usize) -> String {
        (first..first + count)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
