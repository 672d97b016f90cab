use crate::error::GatewayError;
use crate::validation::{expiration_from_offset, verify_alias_format, verify_placeholder_count};
use chrono::{SubsecRound, Utc};
use core_types::{ApiDefinition, ApiStatus, NewApiDefinition, PoolClass, Source};
use database::ApiStore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Writes new API definitions and sources into the control plane.
#[derive(Debug, Clone)]
pub struct Registrar {
    store: ApiStore,
    tracing: bool,
}

impl Registrar {
    /// `tracing` is applied to every tenant pool this registrar provisions.
    pub fn new(store: ApiStore, tracing: bool) -> Self {
        Self { store, tracing }
    }

    /// Fails with `Conflict` if any API already uses `alias`.
    ///
    /// This is a pre-flight check only. The unique constraint on `api_alias`
    /// is what actually guards concurrent registrations.
    pub async fn check_alias_available(&self, alias: &str) -> Result<(), GatewayError> {
        if self.store.count_alias(alias).await? > 0 {
            return Err(GatewayError::Conflict(alias.to_string()));
        }
        Ok(())
    }

    /// Registers an API with its parameter keys and de-identification options.
    ///
    /// All three writes share one transaction. Input is validated before any
    /// storage access: alias format, lifetime, options payload, one key per
    /// placeholder, and that the source has a live pool.
    pub async fn register_api(&self, api: NewApiDefinition) -> Result<ApiDefinition, GatewayError> {
        verify_alias_format(&api.alias)?;

        let reg_date = Utc::now().trunc_subsecs(0);
        let exp_date = expiration_from_offset(&api.expires_in_hours, reg_date)?;

        api.query.parsed_did_options().map_err(|e| {
            GatewayError::Validation(format!("de-identification options must be a JSON object: {}", e))
        })?;
        verify_placeholder_count(&api.query.syntax, &api.query.param_keys)?;

        self.store.registry().tenant(&api.source_id)?;
        self.check_alias_available(&api.alias).await?;

        let id = self
            .store
            .insert_api_definition(&api, reg_date, exp_date)
            .await?;
        info!(alias = %api.alias, api_id = id, source = %api.source_id, %exp_date, "API registered.");

        Ok(ApiDefinition {
            id,
            source_id: api.source_id,
            name: api.name,
            alias: api.alias,
            api_type: api.api_type,
            query: api.query,
            reg_date,
            exp_date,
            status: ApiStatus::Active,
        })
    }

    /// Stores a source and provisions its tenant pool.
    ///
    /// A source without an identifier gets a random UUID. If the pool cannot
    /// be created the stored row is deleted again, so storage never keeps a
    /// source the registry cannot serve.
    pub async fn register_source(&self, mut source: Source) -> Result<Source, GatewayError> {
        if source.id.trim().is_empty() {
            source.id = Uuid::new_v4().to_string();
        }

        self.store.insert_source(&source).await?;

        if let Err(e) = self
            .store
            .registry()
            .create_pool(PoolClass::Tenant, &source, self.tracing)
            .await
        {
            warn!(source = %source.id, error = %e, "Tenant pool creation failed; removing the stored source.");
            if let Err(cleanup) = self.store.delete_source(&source.id).await {
                error!(source = %source.id, error = %cleanup, "Could not remove the orphaned source row.");
            }
            return Err(e.into());
        }

        info!(source = %source.id, name = %source.name, dialect = %source.dialect, "Source registered.");
        Ok(source)
    }
}
