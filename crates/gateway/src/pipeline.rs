use crate::error::GatewayError;
use crate::resolver::ApiResolver;
use crate::validation::{collect_parameters, validate_parameters};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{ApiDefinition, DidOptions, ParamValue};
use database::ConnectionPool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Name reported to the dispatcher for APIs registered without one.
pub const UNDEFINED_API_NAME: &str = "undefined_apiName";

/// The external authorization service. Only the allow/deny contract is used here.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `Ok(true)` if the token may access the gateway.
    async fn authenticate(&self, token: &str) -> Result<bool, GatewayError>;
}

/// Outcome of an export as reported by the de-identification engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub rows: u64,
    /// The k-anonymity level the exported result satisfies, if evaluated.
    pub k_anonymity: Option<u64>,
}

/// Executes resolved APIs against a tenant pool.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn export(
        &self,
        api: &ApiDefinition,
        pool: Arc<ConnectionPool>,
        params: &[ParamValue],
        options: Option<&DidOptions>,
    ) -> Result<EvaluationSummary, GatewayError>;

    async fn mutate(
        &self,
        api: &ApiDefinition,
        pool: Arc<ConnectionPool>,
        params: &[ParamValue],
    ) -> Result<u64, GatewayError>;
}

/// Pulls the bearer token out of an `Authorization` header value.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, GatewayError> {
    let header = header.ok_or_else(|| GatewayError::Unauthorized("missing access token".into()))?;
    let token = match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => return Err(GatewayError::Unauthorized("expected a bearer token".into())),
    };
    if token.is_empty() {
        return Err(GatewayError::Unauthorized("missing access token".into()));
    }
    Ok(token)
}

struct Prepared {
    api: ApiDefinition,
    pool: Arc<ConnectionPool>,
    params: Vec<ParamValue>,
}

/// Runs one request end to end: authenticate, resolve, validate, dispatch.
#[derive(Clone)]
pub struct AccessPipeline {
    resolver: ApiResolver,
    authenticator: Arc<dyn Authenticator>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl AccessPipeline {
    pub fn new(
        resolver: ApiResolver,
        authenticator: Arc<dyn Authenticator>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            resolver,
            authenticator,
            dispatcher,
        }
    }

    /// Serves a read API. Options are applied by the dispatcher.
    pub async fn export(
        &self,
        authorization: Option<&str>,
        alias: &str,
        supplied: &HashMap<String, String>,
    ) -> Result<EvaluationSummary, GatewayError> {
        let prepared = self.prepare(authorization, alias, supplied).await?;
        let options = prepared
            .api
            .query
            .parsed_did_options()
            .map_err(|e| GatewayError::Storage(e.into()))?;

        let summary = self
            .dispatcher
            .export(&prepared.api, prepared.pool, &prepared.params, options.as_ref())
            .await?;
        info!(alias, rows = summary.rows, "Export completed.");
        Ok(summary)
    }

    /// Serves a write API and returns the number of affected rows.
    pub async fn mutate(
        &self,
        authorization: Option<&str>,
        alias: &str,
        supplied: &HashMap<String, String>,
    ) -> Result<u64, GatewayError> {
        let prepared = self.prepare(authorization, alias, supplied).await?;
        let affected = self
            .dispatcher
            .mutate(&prepared.api, prepared.pool, &prepared.params)
            .await?;
        info!(alias, affected, "Mutation completed.");
        Ok(affected)
    }

    async fn prepare(
        &self,
        authorization: Option<&str>,
        alias: &str,
        supplied: &HashMap<String, String>,
    ) -> Result<Prepared, GatewayError> {
        let token = extract_bearer_token(authorization)?;
        if !self.authenticator.authenticate(token).await? {
            return Err(GatewayError::Unauthorized("access token was rejected".into()));
        }

        let mut api = self.resolver.resolve(alias).await?;
        ApiResolver::check_validity(&api, Utc::now())?;

        let params = collect_parameters(&api.query.param_keys, supplied)?;
        validate_parameters(&params, &api.query.param_keys)?;

        let pool = self.resolver.registry().tenant(&api.source_id)?;
        if api.name.trim().is_empty() {
            api.name = UNDEFINED_API_NAME.to_string();
        }

        Ok(Prepared { api, pool, params })
    }
}
