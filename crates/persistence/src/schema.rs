//! Self-healing schema for the registration code table.
//!
//! The applied schema version is kept in `schema_meta`. When it is missing or
//! older than [`SCHEMA_VERSION`], the table, every column and every index are
//! (re)created with `IF NOT EXISTS` forms. Nothing is ever dropped, so an
//! upgrade never loses rows.

use sqlx::{PgConnection, PgPool};

use crate::metrics::QueryTimer;

/// Current schema version of `registration_codes`.
pub const SCHEMA_VERSION: i32 = 3;

/// Key under which the version is stored in `schema_meta`.
pub const VERSION_KEY: &str = "registration_codes_version";

/// Advisory lock key serializing concurrent upgrades across processes.
const UPGRADE_LOCK_KEY: i64 = 0x5245_4743_4f44_4553;

const CREATE_META_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_CODES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS registration_codes (
        id BIGSERIAL PRIMARY KEY,
        code TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'subscriber',
        group_name TEXT,
        course_id BIGINT,
        max_uses INTEGER NOT NULL DEFAULT 1 CHECK (max_uses >= 1),
        used_count INTEGER NOT NULL DEFAULT 0,
        is_used BOOLEAN NOT NULL DEFAULT FALSE,
        used_by BIGINT,
        used_at TIMESTAMPTZ,
        expiry_date TIMESTAMPTZ,
        created_by BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// Columns added to tables created by older versions.
const COLUMNS: &[(&str, &str)] = &[
    ("role", "TEXT NOT NULL DEFAULT 'subscriber'"),
    ("group_name", "TEXT"),
    ("course_id", "BIGINT"),
    ("max_uses", "INTEGER NOT NULL DEFAULT 1 CHECK (max_uses >= 1)"),
    ("used_count", "INTEGER NOT NULL DEFAULT 0"),
    ("is_used", "BOOLEAN NOT NULL DEFAULT FALSE"),
    ("used_by", "BIGINT"),
    ("used_at", "TIMESTAMPTZ"),
    ("expiry_date", "TIMESTAMPTZ"),
    ("created_by", "BIGINT"),
    ("created_at", "TIMESTAMPTZ NOT NULL DEFAULT NOW()"),
];

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_registration_codes_code ON registration_codes (code)",
    "CREATE INDEX IF NOT EXISTS idx_registration_codes_group_name ON registration_codes (group_name)",
    "CREATE INDEX IF NOT EXISTS idx_registration_codes_course_id ON registration_codes (course_id)",
    "CREATE INDEX IF NOT EXISTS idx_registration_codes_expiry_date ON registration_codes (expiry_date)",
    "CREATE INDEX IF NOT EXISTS idx_registration_codes_is_used ON registration_codes (is_used)",
    "CREATE INDEX IF NOT EXISTS idx_registration_codes_created_at ON registration_codes (created_at DESC, id DESC)",
];

fn add_column_sql(name: &str, definition: &str) -> String {
    format!("ALTER TABLE registration_codes ADD COLUMN IF NOT EXISTS {name} {definition}")
}

/// Read the stored schema version. Missing or unparsable values read as 0.
pub async fn stored_version(pool: &PgPool) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;
    lock_upgrades(&mut *tx).await?;
    let version = read_version(&mut *tx).await?;
    tx.commit().await?;
    Ok(version)
}

/// Serialize schema work across processes until the transaction ends.
async fn lock_upgrades(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(UPGRADE_LOCK_KEY)
        .execute(conn)
        .await?;
    Ok(())
}

/// Must run under [`lock_upgrades`]: concurrent `CREATE TABLE IF NOT EXISTS`
/// on a fresh database collide in the catalog.
async fn read_version(conn: &mut PgConnection) -> Result<i32, sqlx::Error> {
    sqlx::query(CREATE_META_TABLE).execute(&mut *conn).await?;

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM schema_meta WHERE key = $1")
            .bind(VERSION_KEY)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(value.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// Returns true when an upgrade ran, false when the schema was current.
pub async fn ensure_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let timer = QueryTimer::new("ensure_schema");
    let result = upgrade_if_needed(pool).await;
    timer.record();
    result
}

async fn upgrade_if_needed(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    lock_upgrades(&mut *tx).await?;

    let current = read_version(&mut *tx).await?;
    if current >= SCHEMA_VERSION {
        tx.commit().await?;
        tracing::debug!(version = current, "Registration code schema is current");
        return Ok(false);
    }

    sqlx::query(CREATE_CODES_TABLE).execute(&mut *tx).await?;

    for (name, definition) in COLUMNS {
        sqlx::query(&add_column_sql(name, definition))
            .execute(&mut *tx)
            .await?;
    }

    for index in INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO schema_meta (key, value, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
        "#,
    )
    .bind(VERSION_KEY)
    .bind(SCHEMA_VERSION.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        from_version = current,
        to_version = SCHEMA_VERSION,
        "Registration code schema upgraded"
    );
    Ok(true)
}
