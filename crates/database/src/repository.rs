use crate::connection::{ConnectionPool, PoolRegistry};
use crate::error::DbError;
use chrono::{DateTime, NaiveDateTime, Utc};
use core_types::{ApiDefinition, ApiStatus, Dialect, NewApiDefinition, QueryContent, Source, DATETIME_FORMAT};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::sync::Arc;

/// The `ApiStore` provides a high-level, application-specific interface to
/// the control-plane database. It encapsulates all SQL for API definitions
/// and sources, always going through the registry's control-plane pool.
#[derive(Debug, Clone)]
pub struct ApiStore {
    registry: Arc<PoolRegistry>,
}

impl ApiStore {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    fn pool(&self) -> Result<Arc<ConnectionPool>, DbError> {
        self.registry.control_plane()
    }

    /// Fetches one API row by alias, joined with its de-identification payload.
    ///
    /// The returned definition has no parameter keys yet; see `find_parameter_keys`.
    pub async fn find_api_by_alias(&self, alias: &str) -> Result<Option<ApiDefinition>, DbError> {
        let pool = self.pool()?;
        let sql = pool.sql(
            r#"
            SELECT a.api_id, a.source_id, a.api_name, a.api_alias, a.api_type, a.syntax,
                   a.reg_date, a.exp_date, a.status, d.options
            FROM api AS a
            LEFT JOIN did_option AS d ON a.api_id = d.api_id
            WHERE a.api_alias = ?
            "#,
        );

        let row = pool
            .run("find_api_by_alias", async {
                Ok::<_, DbError>(
                    sqlx::query(&sql)
                        .bind(alias)
                        .fetch_optional(pool.inner())
                        .await?,
                )
            })
            .await?;

        row.map(|row| api_from_row(&row)).transpose()
    }

    /// Fetches the parameter keys of an API in the order they were registered.
    pub async fn find_parameter_keys(&self, api_id: i64) -> Result<Vec<String>, DbError> {
        let pool = self.pool()?;
        let sql = pool.sql("SELECT parameter_key FROM parameter WHERE api_id = ? ORDER BY ordinal ASC");

        pool.run("find_parameter_keys", async {
            let keys: Vec<String> = sqlx::query_scalar(&sql)
                .bind(api_id)
                .fetch_all(pool.inner())
                .await?;
            Ok::<_, DbError>(keys)
        })
        .await
    }

    /// Fetches the raw de-identification payload of an API, if it has one.
    pub async fn find_did_options(&self, api_id: i64) -> Result<Option<String>, DbError> {
        let pool = self.pool()?;
        let sql = pool.sql("SELECT options FROM did_option WHERE api_id = ?");

        pool.run("find_did_options", async {
            let options: Option<String> = sqlx::query_scalar(&sql)
                .bind(api_id)
                .fetch_optional(pool.inner())
                .await?;
            Ok::<_, DbError>(options)
        })
        .await
    }

    /// Counts the API rows already using an alias.
    pub async fn count_alias(&self, alias: &str) -> Result<i64, DbError> {
        let pool = self.pool()?;
        let sql = pool.sql("SELECT COUNT(*) FROM api WHERE api_alias = ?");

        pool.run("count_alias", async {
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(alias)
                .fetch_one(pool.inner())
                .await?;
            Ok::<_, DbError>(count)
        })
        .await
    }

    /// Saves an API, its parameter keys and its de-identification payload
    /// within a single transaction for atomicity.
    ///
    /// Returns the generated `api_id`. A unique-constraint violation on the
    /// alias is reported as `DbError::Conflict`; every other failure rolls
    /// the whole transaction back and surfaces as `DbError::Transaction`.
    pub async fn insert_api_definition(
        &self,
        api: &NewApiDefinition,
        reg_date: DateTime<Utc>,
        exp_date: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let pool = self.pool()?;
        let insert_api = pool.sql(
            r#"
            INSERT INTO api (source_id, api_name, api_alias, api_type, syntax, reg_date, exp_date, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        );
        let select_id = pool.sql("SELECT api_id FROM api WHERE api_alias = ?");
        let insert_param = pool.sql("INSERT INTO parameter (api_id, ordinal, parameter_key) VALUES (?, ?, ?)");
        let insert_options = pool.sql("INSERT INTO did_option (api_id, options) VALUES (?, ?)");

        pool.run("insert_api_definition", async {
            // Dropping `tx` on any early return rolls it back.
            let mut tx = pool.inner().begin().await.map_err(DbError::Transaction)?;

            sqlx::query(&insert_api)
                .bind(&api.source_id)
                .bind(&api.name)
                .bind(&api.alias)
                .bind(&api.api_type)
                .bind(&api.query.syntax)
                .bind(format_datetime(reg_date))
                .bind(format_datetime(exp_date))
                .bind(ApiStatus::Active.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| insert_error(e, &api.alias))?;

            let api_id: i64 = sqlx::query_scalar(&select_id)
                .bind(&api.alias)
                .fetch_one(&mut *tx)
                .await
                .map_err(DbError::Transaction)?;

            for (ordinal, key) in api.query.param_keys.iter().enumerate() {
                sqlx::query(&insert_param)
                    .bind(api_id)
                    .bind(ordinal as i64)
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .map_err(DbError::Transaction)?;
            }

            if let Some(options) = api.query.did_options.as_deref().filter(|o| !o.trim().is_empty()) {
                sqlx::query(&insert_options)
                    .bind(api_id)
                    .bind(options)
                    .execute(&mut *tx)
                    .await
                    .map_err(DbError::Transaction)?;
            }

            tx.commit().await.map_err(DbError::Transaction)?;
            Ok::<_, DbError>(api_id)
        })
        .await
    }

    /// Saves a source row.
    pub async fn insert_source(&self, source: &Source) -> Result<(), DbError> {
        let pool = self.pool()?;
        let sql = pool.sql(
            r#"
            INSERT INTO source (source_id, source_category, source_type, source_name, real_dsn, fake_dsn)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        );

        pool.run("insert_source", async {
            sqlx::query(&sql)
                .bind(&source.id)
                .bind(&source.category)
                .bind(source.dialect.as_str())
                .bind(&source.name)
                .bind(&source.real_dsn)
                .bind(source.fake_dsn.as_deref())
                .execute(pool.inner())
                .await?;
            Ok::<_, DbError>(())
        })
        .await
    }

    /// Deletes a source row. Returns the number of rows removed.
    pub async fn delete_source(&self, source_id: &str) -> Result<u64, DbError> {
        let pool = self.pool()?;
        let sql = pool.sql("DELETE FROM source WHERE source_id = ?");

        pool.run("delete_source", async {
            let result = sqlx::query(&sql).bind(source_id).execute(pool.inner()).await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await
    }

    /// Fetches every registered source.
    pub async fn list_sources(&self) -> Result<Vec<Source>, DbError> {
        let pool = self.pool()?;
        load_sources(&pool).await
    }
}

/// Reads all sources through an explicit pool. The registry calls this while
/// it is still initializing.
pub(crate) async fn load_sources(pool: &ConnectionPool) -> Result<Vec<Source>, DbError> {
    let sql = pool.sql(
        "SELECT source_id, source_category, source_type, source_name, real_dsn, fake_dsn FROM source ORDER BY source_id",
    );

    let rows = pool
        .run("load_sources", async {
            Ok::<_, DbError>(sqlx::query(&sql).fetch_all(pool.inner()).await?)
        })
        .await?;

    rows.iter().map(source_from_row).collect()
}

fn insert_error(e: sqlx::Error, alias: &str) -> DbError {
    let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        DbError::Conflict(alias.to_string())
    } else {
        DbError::Transaction(e)
    }
}

fn api_from_row(row: &AnyRow) -> Result<ApiDefinition, DbError> {
    let status: String = row.try_get("status")?;
    Ok(ApiDefinition {
        id: row.try_get("api_id")?,
        source_id: row.try_get("source_id")?,
        name: row.try_get("api_name")?,
        alias: row.try_get("api_alias")?,
        api_type: row.try_get("api_type")?,
        query: QueryContent {
            syntax: row.try_get("syntax")?,
            param_keys: Vec::new(),
            did_options: row.try_get("options")?,
        },
        reg_date: parse_datetime(&row.try_get::<String, _>("reg_date")?)?,
        exp_date: parse_datetime(&row.try_get::<String, _>("exp_date")?)?,
        status: status
            .parse::<ApiStatus>()
            .map_err(|e| DbError::Decode(e.to_string()))?,
    })
}

fn source_from_row(row: &AnyRow) -> Result<Source, DbError> {
    let dialect: String = row.try_get("source_type")?;
    Ok(Source {
        id: row.try_get("source_id")?,
        category: row.try_get("source_category")?,
        dialect: dialect
            .parse::<Dialect>()
            .map_err(|e| DbError::Decode(e.to_string()))?,
        name: row.try_get("source_name")?,
        real_dsn: row.try_get("real_dsn")?,
        fake_dsn: row.try_get("fake_dsn")?,
    })
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, DbError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| DbError::Decode(format!("invalid timestamp '{}': {}", value, e)))
}
