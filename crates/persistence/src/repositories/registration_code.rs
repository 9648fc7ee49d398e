//! Registration code repository.
//!
//! PostgreSQL implementation of [`CodeStore`]. Every operation first makes
//! sure the schema is current; the check runs once per repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::OnceCell;

use domain::models::code::{Code, CodeFilter, CodeStats, NewCode, SortOrder};
use domain::services::code_store::{CodeStore, StoreError};
use shared::pagination::Page;

use crate::entities::{CodeStatsEntity, RegistrationCodeEntity};
use crate::metrics::{record_pool_metrics, QueryTimer};
use crate::schema::ensure_schema;

/// Shared `WHERE` clause for filtered queries; binds `$1..=$5`.
const FILTER_CLAUSE: &str = r#"
    WHERE ($1::TEXT IS NULL OR group_name = $1)
      AND ($2::BIGINT IS NULL OR course_id = $2)
      AND ($3::BOOLEAN IS NULL OR is_used = $3)
      AND ($4::TEXT IS NULL OR role = $4)
      AND ($5::BIGINT IS NULL OR created_by = $5)
"#;

macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {
        $query
            .bind($filter.group_name.as_deref())
            .bind($filter.course_id)
            .bind($filter.is_used)
            .bind($filter.role.as_deref())
            .bind($filter.created_by)
    };
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Newest => "ORDER BY created_at DESC, id DESC",
        SortOrder::Oldest => "ORDER BY created_at ASC, id ASC",
    }
}

/// Repository for registration code database operations.
#[derive(Clone)]
pub struct RegistrationCodeRepository {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl RegistrationCodeRepository {
    /// Creates a new RegistrationCodeRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ready(&self) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| async {
                ensure_schema(&self.pool).await?;
                Ok::<(), sqlx::Error>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CodeStore for RegistrationCodeRepository {
    async fn insert(&self, new_code: &NewCode) -> Result<Option<Code>, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("insert_registration_code");

        let result = sqlx::query_as::<_, RegistrationCodeEntity>(
            r#"
            INSERT INTO registration_codes
                (code, role, group_name, course_id, max_uses, expiry_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            RETURNING id, code, role, group_name, course_id, max_uses, used_count,
                      is_used, used_by, used_at, expiry_date, created_by, created_at
            "#,
        )
        .bind(&new_code.code)
        .bind(&new_code.role)
        .bind(new_code.group_name.as_deref())
        .bind(new_code.course_id)
        .bind(new_code.max_uses)
        .bind(new_code.expiry_date)
        .bind(new_code.created_by)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        Ok(result?.map(Code::from))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Code>, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("find_registration_code_by_code");

        let result = sqlx::query_as::<_, RegistrationCodeEntity>(
            r#"
            SELECT id, code, role, group_name, course_id, max_uses, used_count,
                   is_used, used_by, used_at, expiry_date, created_by, created_at
            FROM registration_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        Ok(result?.map(Code::from))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Code>, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("find_registration_code_by_id");

        let result = sqlx::query_as::<_, RegistrationCodeEntity>(
            r#"
            SELECT id, code, role, group_name, course_id, max_uses, used_count,
                   is_used, used_by, used_at, expiry_date, created_by, created_at
            FROM registration_codes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        Ok(result?.map(Code::from))
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("registration_code_exists");

        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM registration_codes WHERE code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await;

        timer.record();
        Ok(result?)
    }

    async fn list(&self, filter: &CodeFilter, page: Page) -> Result<Vec<Code>, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("list_registration_codes");

        let sql = format!(
            r#"
            SELECT id, code, role, group_name, course_id, max_uses, used_count,
                   is_used, used_by, used_at, expiry_date, created_by, created_at
            FROM registration_codes
            {FILTER_CLAUSE}
            {}
            LIMIT $6 OFFSET $7
            "#,
            order_clause(filter.order)
        );

        let result = bind_filter!(sqlx::query_as::<_, RegistrationCodeEntity>(&sql), filter)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await;

        timer.record();
        Ok(result?.into_iter().map(Code::from).collect())
    }

    async fn count(&self, filter: &CodeFilter) -> Result<i64, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("count_registration_codes");

        let sql = format!("SELECT COUNT(*) FROM registration_codes {FILTER_CLAUSE}");
        let result = bind_filter!(sqlx::query_scalar::<_, i64>(&sql), filter)
            .fetch_one(&self.pool)
            .await;

        timer.record();
        Ok(result?)
    }

    async fn stats(
        &self,
        filter: &CodeFilter,
        now: DateTime<Utc>,
    ) -> Result<CodeStats, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("registration_code_stats");

        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_used) AS used,
                COUNT(*) FILTER (WHERE NOT is_used) AS unused,
                COUNT(*) FILTER (WHERE NOT is_used AND expiry_date < $6) AS expired,
                COALESCE(SUM(used_count), 0)::BIGINT AS redemptions
            FROM registration_codes
            {FILTER_CLAUSE}
            "#
        );

        let result = bind_filter!(sqlx::query_as::<_, CodeStatsEntity>(&sql), filter)
            .bind(now)
            .fetch_one(&self.pool)
            .await;

        timer.record();
        Ok(result?.into())
    }

    async fn redeem(
        &self,
        code: &str,
        redeemer_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Code>, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("redeem_registration_code");

        // Right-hand sides see the pre-update row, so is_used is computed
        // from the incremented count in the same statement.
        let result = sqlx::query_as::<_, RegistrationCodeEntity>(
            r#"
            UPDATE registration_codes
            SET used_count = used_count + 1,
                is_used = (used_count + 1 >= max_uses),
                used_by = $2,
                used_at = $3
            WHERE code = $1
              AND used_count < max_uses
              AND (expiry_date IS NULL OR expiry_date >= $3)
            RETURNING id, code, role, group_name, course_id, max_uses, used_count,
                      is_used, used_by, used_at, expiry_date, created_by, created_at
            "#,
        )
        .bind(code)
        .bind(redeemer_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        Ok(result?.map(Code::from))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("delete_registration_code");

        let result = sqlx::query("DELETE FROM registration_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        timer.record();
        Ok(result?.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64, StoreError> {
        self.ready().await?;
        let timer = QueryTimer::new("delete_registration_codes");

        let result = sqlx::query("DELETE FROM registration_codes WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await;

        timer.record();
        Ok(result?.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let timer = QueryTimer::new("ping");
        let result = sqlx::query("SELECT 1").execute(&self.pool).await;
        timer.record();
        record_pool_metrics(&self.pool);

        result?;
        self.ready().await
    }
}
