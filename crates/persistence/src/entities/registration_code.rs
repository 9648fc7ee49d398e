//! Registration code entity for database operations.

use chrono::{DateTime, Utc};
use domain::models::code::{Code, CodeRecord};
use sqlx::FromRow;

/// Database entity for registration codes.
#[derive(Debug, Clone, FromRow)]
pub struct RegistrationCodeEntity {
    pub id: i64,
    pub code: String,
    pub role: String,
    pub group_name: Option<String>,
    pub course_id: Option<i64>,
    pub max_uses: i32,
    pub used_count: i32,
    pub is_used: bool,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<RegistrationCodeEntity> for Code {
    fn from(entity: RegistrationCodeEntity) -> Self {
        Code::from(CodeRecord {
            id: entity.id,
            code: entity.code,
            role: entity.role,
            group_name: entity.group_name,
            course_id: entity.course_id,
            max_uses: entity.max_uses,
            used_count: entity.used_count,
            is_used: entity.is_used,
            used_by: entity.used_by,
            used_at: entity.used_at,
            expiry_date: entity.expiry_date,
            created_by: entity.created_by,
            created_at: entity.created_at,
        })
    }
}

/// Aggregate row returned by the stats query.
#[derive(Debug, Clone, FromRow)]
pub struct CodeStatsEntity {
    pub total: i64,
    pub used: i64,
    pub unused: i64,
    pub expired: i64,
    pub redemptions: i64,
}

impl From<CodeStatsEntity> for domain::models::code::CodeStats {
    fn from(entity: CodeStatsEntity) -> Self {
        Self {
            total: entity.total,
            used: entity.used,
            unused: entity.unused,
            expired: entity.expired,
            redemptions: entity.redemptions,
        }
    }
}
