use crate::error::GatewayError;
use crate::validation::{count_placeholders, validate_parameters, verify_alias_format};
use chrono::{DateTime, Utc};
use core_types::{ApiDefinition, ApiStatus, DidOptions};
use database::{ApiStore, PoolRegistry};
use std::sync::Arc;
use tracing::debug;

/// Resolves external API aliases against the control plane.
#[derive(Debug, Clone)]
pub struct ApiResolver {
    store: ApiStore,
}

impl ApiResolver {
    pub fn new(store: ApiStore) -> Self {
        Self { store }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        self.store.registry()
    }

    /// Fetches the definition behind an alias, parameter keys included.
    ///
    /// The alias format is checked before the control plane is touched.
    pub async fn resolve(&self, alias: &str) -> Result<ApiDefinition, GatewayError> {
        verify_alias_format(alias)?;

        let mut api = self.store.find_api_by_alias(alias).await?.ok_or_else(|| {
            GatewayError::NotFound(format!(
                "API '{}' (please check if the API alias is correct)",
                alias
            ))
        })?;

        api.query.param_keys = self.store.find_parameter_keys(api.id).await?;
        if api.query.param_keys.is_empty() {
            let expected = count_placeholders(&api.query.syntax);
            if expected > 0 {
                return Err(GatewayError::InconsistentDefinition {
                    alias: alias.to_string(),
                    expected,
                });
            }
        }

        debug!(alias, api_id = api.id, source = %api.source_id, params = api.query.param_keys.len(), "API resolved.");
        Ok(api)
    }

    /// Checks expiration first, then status. The first failure is returned.
    ///
    /// A definition whose expiration equals `now` is still valid.
    pub fn check_validity(api: &ApiDefinition, now: DateTime<Utc>) -> Result<(), GatewayError> {
        if api.exp_date < now {
            return Err(GatewayError::Expired);
        }
        if api.status == ApiStatus::Disabled {
            return Err(GatewayError::Disabled);
        }
        Ok(())
    }

    /// Only the number of supplied values is compared with the required keys.
    pub fn validate_parameters<T>(supplied: &[T], required: &[String]) -> Result<(), GatewayError> {
        validate_parameters(supplied, required)
    }

    /// Loads and deserializes the de-identification options of an API.
    pub async fn did_options(&self, api_id: i64) -> Result<Option<DidOptions>, GatewayError> {
        let Some(raw) = self.store.find_did_options(api_id).await? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GatewayError::Storage(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use core_types::QueryContent;

    fn definition(exp_date: DateTime<Utc>, status: ApiStatus) -> ApiDefinition {
        ApiDefinition {
            id: 7,
            source_id: "T1".into(),
            name: "marketing".into(),
            alias: "a_marketing_01".into(),
            api_type: "export".into(),
            query: QueryContent::default(),
            reg_date: exp_date - TimeDelta::hours(24),
            exp_date,
            status,
        }
    }

    #[test]
    fn expiration_boundary_is_inclusive() {
        let exp = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let api = definition(exp, ApiStatus::Active);

        assert!(ApiResolver::check_validity(&api, exp - TimeDelta::seconds(1)).is_ok());
        assert!(ApiResolver::check_validity(&api, exp).is_ok());
        assert!(matches!(
            ApiResolver::check_validity(&api, exp + TimeDelta::seconds(1)),
            Err(GatewayError::Expired)
        ));
    }

    #[test]
    fn expiration_is_reported_before_status() {
        let exp = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();

        let disabled = definition(exp, ApiStatus::Disabled);
        assert!(matches!(
            ApiResolver::check_validity(&disabled, exp),
            Err(GatewayError::Disabled)
        ));
        assert!(matches!(
            ApiResolver::check_validity(&disabled, exp + TimeDelta::hours(1)),
            Err(GatewayError::Expired)
        ));
    }

    #[tokio::test]
    async fn malformed_alias_fails_without_storage_access() {
        // No control-plane pool exists, so any storage access would fail with NotFound.
        let registry = Arc::new(PoolRegistry::new(Default::default()));
        let resolver = ApiResolver::new(ApiStore::new(registry));

        assert!(matches!(
            resolver.resolve("bad_alias").await,
            Err(GatewayError::InvalidAliasFormat(alias)) if alias == "bad_alias"
        ));
        assert!(matches!(
            resolver.resolve("a_valid_but_unreachable").await,
            Err(GatewayError::NotFound(_))
        ));
    }
}
