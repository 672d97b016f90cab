use crate::connection::ConnectionPool;
use crate::error::DbError;
use core_types::Dialect;

/// Creates the control-plane tables if they do not exist yet.
///
/// The DDL is shared between dialects except for the auto-increment key of
/// the `api` table. Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text.
pub async fn ensure_schema(pool: &ConnectionPool) -> Result<(), DbError> {
    pool.run("ensure_schema", async {
        for statement in statements(pool.dialect()) {
            sqlx::query(&statement).execute(pool.inner()).await?;
        }
        Ok::<(), DbError>(())
    })
    .await?;

    tracing::info!(dialect = %pool.dialect(), "Control-plane schema is up to date.");
    Ok(())
}

fn statements(dialect: Dialect) -> Vec<String> {
    let api_id = match dialect {
        Dialect::MySql => "api_id BIGINT AUTO_INCREMENT PRIMARY KEY",
        Dialect::Postgres => "api_id BIGSERIAL PRIMARY KEY",
        Dialect::Sqlite => "api_id INTEGER PRIMARY KEY AUTOINCREMENT",
    };

    vec![
        r#"CREATE TABLE IF NOT EXISTS source (
            source_id VARCHAR(64) NOT NULL PRIMARY KEY,
            source_category VARCHAR(32) NOT NULL,
            source_type VARCHAR(32) NOT NULL,
            source_name VARCHAR(255) NOT NULL,
            real_dsn TEXT NOT NULL,
            fake_dsn TEXT NULL
        )"#
        .to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS api (
            {api_id},
            source_id VARCHAR(64) NOT NULL,
            api_name VARCHAR(255) NOT NULL,
            api_alias VARCHAR(255) NOT NULL UNIQUE,
            api_type VARCHAR(32) NOT NULL,
            syntax TEXT NOT NULL,
            reg_date VARCHAR(19) NOT NULL,
            exp_date VARCHAR(19) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'active'
        )"#
        ),
        r#"CREATE TABLE IF NOT EXISTS parameter (
            api_id BIGINT NOT NULL,
            ordinal BIGINT NOT NULL,
            parameter_key VARCHAR(255) NOT NULL,
            FOREIGN KEY (api_id) REFERENCES api (api_id)
        )"#
        .to_string(),
        r#"CREATE TABLE IF NOT EXISTS did_option (
            api_id BIGINT NOT NULL PRIMARY KEY,
            options TEXT NOT NULL,
            FOREIGN KEY (api_id) REFERENCES api (api_id)
        )"#
        .to_string(),
    ]
}
