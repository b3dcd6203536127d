use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{
    ChangeBus, ChangeEvent, ChangeHub, ChangeKind, Collection, EventMask, Filter, Query,
    RemoteProcedures, Row, RowStore, Subscription,
};
use crate::config::BackendConfig;
use crate::domain::{CredentialCheck, ImportOutcome};
use crate::error::{AppError, Result};

/// Client for the hosted PostgREST-style backend.
///
/// The change hub only sees writes made through this client; readers that need
/// other clients' writes enable the polling fallback of their bindings.
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    bearer: String,
    hub: ChangeHub,
}

impl RestBackend {
    /// Client authenticated with the public key, as contest views use it.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::build(config, config.api_key.clone())
    }

    /// Client authenticated with the service key, for bulk maintenance tools.
    pub fn with_service_key(config: &BackendConfig) -> Result<Self> {
        let key = config
            .service_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Validation("backend.service_key is not set".to_string()))?;
        Self::build(config, key)
    }

    fn build(config: &BackendConfig, bearer: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            bearer,
            hub: ChangeHub::default(),
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }

    fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, name)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => AppError::Conflict(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Forbidden,
            StatusCode::NOT_FOUND => AppError::NotFound(body),
            _ => AppError::External(format!("{}: {}", status, body)),
        })
    }

    async fn call<T: DeserializeOwned>(&self, name: &str, args: Value) -> Result<T> {
        tracing::debug!("Calling remote procedure {}", name);
        let response = self
            .authorized(self.client.post(self.rpc_url(name)))
            .json(&args)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }
}

fn value_param(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), value_param(&f.value)))
        .collect()
}

/// Query-string pairs for a select, in PostgREST syntax.
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl RowStore for RestBackend {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>> {
        let response = self
            .authorized(self.client.get(self.table_url(collection)))
            .query(&query_params(query))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }

    async fn insert(&self, collection: Collection, row: Row) -> Result<Row> {
        let response = self
            .authorized(self.client.post(self.table_url(collection)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let inserted = response
            .json::<Vec<Row>>()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::InvalidRecord(format!("insert into {} returned no row", collection)))?;

        self.hub.publish(ChangeEvent {
            collection,
            kind: ChangeKind::Insert,
            new_row: Some(inserted.clone()),
            old_row: None,
        });
        Ok(inserted)
    }

    async fn update(&self, collection: Collection, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        let response = self
            .authorized(self.client.patch(self.table_url(collection)))
            .header("Prefer", "return=representation")
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let updated = response.json::<Vec<Row>>().await?;

        for row in &updated {
            self.hub.publish(ChangeEvent {
                collection,
                kind: ChangeKind::Update,
                new_row: Some(row.clone()),
                old_row: None,
            });
        }
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<u64> {
        let response = self
            .authorized(self.client.delete(self.table_url(collection)))
            .header("Prefer", "return=representation")
            .query(&filter_params(filters))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let removed = response.json::<Vec<Row>>().await?;

        for row in &removed {
            self.hub.publish(ChangeEvent {
                collection,
                kind: ChangeKind::Delete,
                new_row: None,
                old_row: Some(row.clone()),
            });
        }
        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl ChangeBus for RestBackend {
    async fn subscribe(&self, collection: Collection, mask: EventMask) -> Result<Subscription> {
        Ok(self.hub.subscribe(collection, mask))
    }
}

#[async_trait]
impl RemoteProcedures for RestBackend {
    async fn get_server_time(&self) -> Result<DateTime<Utc>> {
        let value: Value = self.call("get_server_time", json!({})).await?;
        let stamp = value
            .as_str()
            .ok_or_else(|| AppError::InvalidRecord(format!("unexpected server time: {}", value)))?;
        DateTime::parse_from_rfc3339(stamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::InvalidRecord(format!("unparseable server time {}: {}", stamp, e)))
    }

    async fn verify_team_credentials(&self, username: &str, password: &str) -> Result<CredentialCheck> {
        self.call(
            "verify_team_credentials",
            json!({ "p_username": username, "p_password": password }),
        )
        .await
    }

    async fn insert_team_with_password(
        &self,
        name: &str,
        username: &str,
        password: &str,
    ) -> Result<ImportOutcome> {
        self.call(
            "insert_team_with_password",
            json!({ "p_name": name, "p_username": username, "p_password": password }),
        )
        .await
    }
}
