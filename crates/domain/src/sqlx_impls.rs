//! # SQLx 数据库类型转换实现
//!
//! 本模块仅在启用 `sqlx-support` feature 时编译
//! 领域枚举在 SQLite 中以 TEXT 存储

use std::str::FromStr;

use crate::entities::TaskStatus;
use crate::value_objects::{
    Channel, DeliveryStatus, DependencyType, Frequency, NotificationPriority, NotificationStatus,
    NotificationType, ViolationState,
};

macro_rules! sqlite_text_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl sqlx::Type<sqlx::Sqlite> for $ty {
                fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                    <str as sqlx::Type<sqlx::Sqlite>>::type_info()
                }

                fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                    <&str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
                }
            }

            impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
                fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                    let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                    <$ty>::from_str(s).map_err(|e| e.to_string().into())
                }
            }

            impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
                fn encode_by_ref(
                    &self,
                    buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
                ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                    <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
                }
            }
        )+
    };
}

sqlite_text_enum!(
    DependencyType,
    ViolationState,
    TaskStatus,
    Channel,
    NotificationType,
    NotificationPriority,
    NotificationStatus,
    DeliveryStatus,
    Frequency,
);
