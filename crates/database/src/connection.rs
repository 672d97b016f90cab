use crate::error::DbError;
use crate::repository;
use crate::schema;
use configuration::{ControlPlaneConfig, PoolSettings, PoolsConfig};
use core_types::{Dialect, PoolClass, Source};
use dashmap::DashMap;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Connection};
use std::borrow::Cow;
use std::env;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Builds the `Source` describing the control-plane database.
///
/// A `DATABASE_URL` from the process environment (or the `.env` file) takes
/// precedence over the URL assembled from the configuration.
pub fn control_plane_source(config: &ControlPlaneConfig) -> Result<Source, DbError> {
    // A missing .env file is fine; the configuration may carry everything.
    dotenvy::dotenv().ok();

    let url = match env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => config
            .connection_url()
            .map_err(|e| DbError::ConnectionConfigError(e.to_string()))?,
    };

    Ok(Source::control_plane(config.dialect, url))
}

/// A live, pooled handle to one database together with what we know about it.
#[derive(Debug)]
pub struct ConnectionPool {
    category: String,
    dialect: Dialect,
    name: String,
    tracing: bool,
    query_timeout: Duration,
    pool: AnyPool,
}

impl ConnectionPool {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    /// The underlying sqlx pool, for the dispatch layer's own queries.
    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }

    /// Adapts a `?`-style statement to this pool's dialect.
    pub fn sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        self.dialect.bind_sql(sql)
    }

    /// Runs one database operation against this pool.
    ///
    /// Every operation is bounded by the pool class's query timeout. When the
    /// pool was created with tracing enabled the operation also runs inside
    /// an `info` span named after it.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        let bounded = async {
            match tokio::time::timeout(self.query_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(DbError::Timeout(self.query_timeout)),
            }
        };

        if self.tracing {
            let span = tracing::info_span!("db", pool = %self.name, dialect = %self.dialect, operation);
            bounded.instrument(span).await
        } else {
            bounded.await
        }
    }
}

/// Owns the control-plane pool and every tenant pool.
///
/// Creation does its network round trip before touching shared state, so a
/// lookup never waits on I/O and never sees a half-built entry.
#[derive(Debug)]
pub struct PoolRegistry {
    settings: PoolsConfig,
    control_plane: RwLock<Option<Arc<ConnectionPool>>>,
    tenants: DashMap<String, Arc<ConnectionPool>>,
}

impl PoolRegistry {
    pub fn new(settings: PoolsConfig) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            settings,
            control_plane: RwLock::new(None),
            tenants: DashMap::new(),
        }
    }

    /// Opens the control-plane pool, brings its schema up to date, then opens
    /// one tenant pool per stored source.
    ///
    /// Fails fast: the first pool that cannot be created aborts startup.
    pub async fn initialize(&self, control_plane: &Source, tracing: bool) -> Result<(), DbError> {
        let pool = self
            .create_pool(PoolClass::ControlPlane, control_plane, tracing)
            .await?;
        info!(dialect = %control_plane.dialect, "Successful connection with control-plane database.");

        schema::ensure_schema(&pool).await?;
        let sources = repository::load_sources(&pool).await?;
        for source in &sources {
            self.create_pool(PoolClass::Tenant, source, tracing).await?;
        }
        info!(count = sources.len(), "Successful connection with tenant databases.");

        Ok(())
    }

    /// Opens, configures and pings a pool, then stores it under its class.
    ///
    /// The control-plane slot is overwritten; tenant pools are keyed by
    /// `source.id`. Nothing is stored if the ping fails.
    pub async fn create_pool(
        &self,
        class: PoolClass,
        source: &Source,
        tracing: bool,
    ) -> Result<Arc<ConnectionPool>, DbError> {
        if class == PoolClass::Tenant && source.id.trim().is_empty() {
            return Err(DbError::MissingTenantKey);
        }

        let settings = self.settings.for_class(class);
        let pool = open_pool(source.dialect, &source.real_dsn, settings).map_err(|e| {
            DbError::PoolCreation {
                class,
                name: source.name.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Err(reason) = ping(&pool, settings.ping_timeout()).await {
            pool.close().await;
            warn!(%class, source = %source.name, %reason, "Connection pool failed its liveness check.");
            return Err(DbError::PoolCreation {
                class,
                name: source.name.clone(),
                reason,
            });
        }

        let conn = Arc::new(ConnectionPool {
            category: source.category.clone(),
            dialect: source.dialect,
            name: source.name.clone(),
            tracing,
            query_timeout: settings.query_timeout(),
            pool,
        });

        match class {
            PoolClass::ControlPlane => {
                let mut slot = self
                    .control_plane
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                *slot = Some(Arc::clone(&conn));
            }
            PoolClass::Tenant => {
                if self
                    .tenants
                    .insert(source.id.clone(), Arc::clone(&conn))
                    .is_some()
                {
                    debug!(tenant = %source.id, "Replaced an existing tenant pool.");
                }
            }
        }

        info!(%class, source = %source.name, dialect = %source.dialect, max_connections = settings.max_connections, "Connection pool ready.");
        Ok(conn)
    }

    /// Fetches a pool without any I/O.
    pub fn lookup(&self, class: PoolClass, key: Option<&str>) -> Result<Arc<ConnectionPool>, DbError> {
        match class {
            PoolClass::ControlPlane => self
                .control_plane
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .ok_or(DbError::ControlPlaneUninitialized),
            PoolClass::Tenant => {
                let key = key.ok_or(DbError::MissingTenantKey)?;
                self.tenants
                    .get(key)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| DbError::UnknownTenant(key.to_string()))
            }
        }
    }

    pub fn control_plane(&self) -> Result<Arc<ConnectionPool>, DbError> {
        self.lookup(PoolClass::ControlPlane, None)
    }

    pub fn tenant(&self, key: &str) -> Result<Arc<ConnectionPool>, DbError> {
        self.lookup(PoolClass::Tenant, Some(key))
    }

    /// Identifiers of every registered tenant, sorted.
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Checks that a DSN is reachable without registering anything.
    pub async fn test_connection(&self, dialect: Dialect, dsn: &str) -> Result<(), DbError> {
        let mut settings = self.settings.tenant.clone();
        settings.max_connections = 1;

        let pool = open_pool(dialect, dsn, &settings).map_err(|e| DbError::PoolCreation {
            class: PoolClass::Tenant,
            name: dialect.to_string(),
            reason: e.to_string(),
        })?;
        let result = ping(&pool, settings.ping_timeout()).await;
        pool.close().await;

        result.map_err(|reason| DbError::PoolCreation {
            class: PoolClass::Tenant,
            name: dialect.to_string(),
            reason,
        })
    }
}

fn open_pool(dialect: Dialect, dsn: &str, settings: &PoolSettings) -> Result<AnyPool, sqlx::Error> {
    let url = dialect.connection_url(dsn);
    AnyPoolOptions::new()
        .max_connections(settings.max_connections)
        .idle_timeout(settings.idle_timeout())
        .acquire_timeout(settings.acquire_timeout())
        .connect_lazy(&url)
}

async fn ping(pool: &AnyPool, limit: Duration) -> Result<(), String> {
    let attempt = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    };

    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("ping timed out after {:?}", limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sqlite_source(id: &str, path: &Path) -> Source {
        Source {
            id: id.to_string(),
            category: "sql".into(),
            dialect: Dialect::Sqlite,
            name: format!("{}_db", id),
            real_dsn: format!("sqlite://{}?mode=rwc", path.display()),
            fake_dsn: None,
        }
    }

    #[tokio::test]
    async fn lookups_fail_before_any_pool_exists() {
        let registry = PoolRegistry::new(PoolsConfig::default());

        assert!(matches!(registry.control_plane(), Err(DbError::ControlPlaneUninitialized)));
        assert!(matches!(registry.tenant("T1"), Err(DbError::UnknownTenant(k)) if k == "T1"));
        assert!(matches!(
            registry.lookup(PoolClass::Tenant, None),
            Err(DbError::MissingTenantKey)
        ));
    }

    #[tokio::test]
    async fn tenant_pool_is_stored_under_its_source_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PoolRegistry::new(PoolsConfig::default());
        let source = sqlite_source("T1", &dir.path().join("t1.db"));

        registry.create_pool(PoolClass::Tenant, &source, false).await.unwrap();

        let first = registry.tenant("T1").unwrap();
        let second = registry.tenant("T1").unwrap();
        assert_eq!(first.dialect(), Dialect::Sqlite);
        assert_eq!(first.name(), "T1_db");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.tenant_ids(), vec!["T1".to_string()]);
        assert_eq!(registry.tenant_count(), 1);
        // A tenant pool never fills the control-plane slot.
        assert!(registry.control_plane().is_err());
    }

    #[tokio::test]
    async fn failed_ping_leaves_registry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PoolRegistry::new(PoolsConfig::default());
        let good = sqlite_source("T1", &dir.path().join("t1.db"));
        registry.create_pool(PoolClass::Tenant, &good, false).await.unwrap();
        let before = registry.tenant("T1").unwrap();

        // Read-only mode on a file that does not exist cannot be opened.
        let mut broken = sqlite_source("T1", &dir.path().join("missing.db"));
        broken.real_dsn = format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display());

        let err = registry
            .create_pool(PoolClass::Tenant, &broken, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::PoolCreation { class: PoolClass::Tenant, .. }));

        let after = registry.tenant("T1").unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        broken.id = "T2".into();
        assert!(registry.create_pool(PoolClass::Tenant, &broken, false).await.is_err());
        assert!(matches!(registry.tenant("T2"), Err(DbError::UnknownTenant(_))));
    }

    #[tokio::test]
    async fn tenant_without_identifier_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PoolRegistry::new(PoolsConfig::default());
        let source = sqlite_source("", &dir.path().join("anon.db"));

        let err = registry.create_pool(PoolClass::Tenant, &source, false).await.unwrap_err();
        assert!(matches!(err, DbError::MissingTenantKey));
    }

    #[tokio::test]
    async fn readers_never_observe_partial_entries_during_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PoolRegistry::new(PoolsConfig::default()));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    for id in registry.tenant_ids() {
                        let pool = registry.tenant(&id).expect("listed tenant must resolve");
                        assert_eq!(pool.dialect(), Dialect::Sqlite);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 0..5 {
            let source = sqlite_source(&format!("T{}", i), &dir.path().join(format!("t{}.db", i)));
            registry.create_pool(PoolClass::Tenant, &source, false).await.unwrap();
        }

        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(registry.tenant_ids().len(), 5);
        assert_eq!(registry.tenant_count(), 5);
    }

    #[tokio::test]
    async fn test_connection_does_not_register_anything() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PoolRegistry::new(PoolsConfig::default());
        let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("reachable.db").display());

        registry.test_connection(Dialect::Sqlite, &dsn).await.unwrap();
        assert_eq!(registry.tenant_count(), 0);

        let missing = format!("sqlite://{}?mode=ro", dir.path().join("nope.db").display());
        assert!(registry.test_connection(Dialect::Sqlite, &missing).await.is_err());
    }

    #[tokio::test]
    async fn run_applies_the_query_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = PoolsConfig::default();
        settings.tenant.query_timeout_secs = 1;
        let registry = PoolRegistry::new(settings);
        let source = sqlite_source("slow", &dir.path().join("slow.db"));
        let pool = registry.create_pool(PoolClass::Tenant, &source, true).await.unwrap();

        let result: Result<(), DbError> = pool
            .run("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Timeout(_))));
    }
}
