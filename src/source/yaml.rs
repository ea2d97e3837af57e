//! YAML-backed data source.
//!
//! Loads gateway endpoints from a validated YAML document, watches the file
//! for writes, and emits diff-based create/update/delete events. A reload
//! that fails validation leaves the previous in-memory state authoritative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::catalog::EndpointMap;
use crate::error::{Result, ServerError};
use crate::proto::{
    Auth, AuthDataUpdate, CapacityLimitPeriod, GatewayEndpoint, Metadata, RateLimiting,
};
use crate::source::{AuthDataSource, UPDATE_CHANNEL_CAPACITY};

/* --------------------------- Document shape --------------------------- */

/// Top-level shape of the gateway endpoints document. The map key is the
/// endpoint id.
#[derive(Debug, Default, Deserialize)]
struct GatewayEndpointsDoc {
    #[serde(default)]
    endpoints: HashMap<String, EndpointDoc>,
}

/// A single gateway endpoint entry. All sections are optional; an absent
/// `auth` section means the endpoint is public.
#[derive(Debug, Default, Deserialize)]
struct EndpointDoc {
    #[serde(default)]
    auth: AuthDoc,
    rate_limiting: Option<RateLimitingDoc>,
    metadata: Option<MetadataDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthDoc {
    api_key: Option<String>,
    jwt_authorized_users: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitingDoc {
    #[serde(default)]
    throughput_limit: i32,
    #[serde(default)]
    capacity_limit: i32,
    capacity_limit_period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataDoc {
    name: Option<String>,
    account_id: Option<String>,
    user_id: Option<String>,
    plan_type: Option<String>,
    email: Option<String>,
    environment: Option<String>,
}

/* ----------------------------- Validation ----------------------------- */

impl GatewayEndpointsDoc {
    fn validate(&self) -> Result<()> {
        for (endpoint_id, endpoint) in &self.endpoints {
            endpoint.validate(endpoint_id)?;
        }
        Ok(())
    }
}

impl EndpointDoc {
    fn validate(&self, endpoint_id: &str) -> Result<()> {
        if endpoint_id.is_empty() {
            return Err(ServerError::Validation(
                "endpoint id must not be empty".to_string(),
            ));
        }
        self.auth.validate(endpoint_id)?;
        if let Some(rate_limiting) = &self.rate_limiting {
            rate_limiting.validate(endpoint_id)?;
        }
        Ok(())
    }
}

impl AuthDoc {
    fn validate(&self, endpoint_id: &str) -> Result<()> {
        if self.api_key.is_some() && self.jwt_authorized_users.is_some() {
            return Err(ServerError::Validation(format!(
                "endpoint {endpoint_id}: auth must not set both api_key and jwt_authorized_users"
            )));
        }
        if let Some(api_key) = &self.api_key {
            if api_key.is_empty() {
                return Err(ServerError::Validation(format!(
                    "endpoint {endpoint_id}: auth api_key must not be empty"
                )));
            }
        }
        Ok(())
    }
}

impl RateLimitingDoc {
    fn validate(&self, endpoint_id: &str) -> Result<()> {
        if self.throughput_limit < 0 {
            return Err(ServerError::Validation(format!(
                "endpoint {endpoint_id}: throughput_limit must not be negative"
            )));
        }
        if self.capacity_limit < 0 {
            return Err(ServerError::Validation(format!(
                "endpoint {endpoint_id}: capacity_limit must not be negative"
            )));
        }

        let period = match &self.capacity_limit_period {
            Some(raw) => CapacityLimitPeriod::parse_document_value(raw).ok_or_else(|| {
                ServerError::Validation(format!(
                    "endpoint {endpoint_id}: invalid capacity_limit_period: {raw}"
                ))
            })?,
            None => CapacityLimitPeriod::Unspecified,
        };

        if self.capacity_limit > 0 && !period.is_enforceable() {
            return Err(ServerError::Validation(format!(
                "endpoint {endpoint_id}: capacity_limit_period is required when capacity_limit is set"
            )));
        }

        Ok(())
    }
}

/* ----------------------------- Conversion ----------------------------- */

impl GatewayEndpointsDoc {
    fn into_endpoints(self) -> EndpointMap {
        self.endpoints
            .into_iter()
            .map(|(endpoint_id, endpoint)| {
                let converted = endpoint.into_proto(&endpoint_id);
                (endpoint_id, converted)
            })
            .collect()
    }
}

impl EndpointDoc {
    fn into_proto(self, endpoint_id: &str) -> GatewayEndpoint {
        GatewayEndpoint {
            endpoint_id: endpoint_id.to_string(),
            auth: Some(self.auth.into_proto()),
            rate_limiting: self.rate_limiting.map(RateLimitingDoc::into_proto),
            metadata: self.metadata.map(MetadataDoc::into_proto),
        }
    }
}

impl AuthDoc {
    fn into_proto(self) -> Auth {
        if let Some(api_key) = self.api_key {
            return Auth::static_api_key(api_key);
        }
        if let Some(users) = self.jwt_authorized_users {
            if !users.is_empty() {
                return Auth::jwt(users);
            }
        }
        Auth::no_auth()
    }
}

impl RateLimitingDoc {
    fn into_proto(self) -> RateLimiting {
        let period = self
            .capacity_limit_period
            .as_deref()
            .and_then(CapacityLimitPeriod::parse_document_value)
            .unwrap_or(CapacityLimitPeriod::Unspecified);

        RateLimiting {
            throughput_limit: self.throughput_limit,
            capacity_limit: self.capacity_limit,
            capacity_limit_period: period.into(),
        }
    }
}

impl MetadataDoc {
    fn into_proto(self) -> Metadata {
        Metadata {
            name: self.name.unwrap_or_default(),
            account_id: self.account_id.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            plan_type: self.plan_type.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            environment: self.environment.unwrap_or_default(),
        }
    }
}

/* ------------------------------ Data source ---------------------------- */

/// Watched YAML document data source.
pub struct YamlAuthDataSource {
    path: PathBuf,
    updates_rx: std::sync::Mutex<Option<mpsc::Receiver<AuthDataUpdate>>>,
    watcher_handle: JoinHandle<()>,
}

impl YamlAuthDataSource {
    /// Loads and validates the document, then starts watching it for writes.
    ///
    /// Construction fails when the document cannot be read or fails
    /// validation, making a bad document a startup error.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let initial = load_endpoints(&path).await?;

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let endpoints = Arc::new(Mutex::new(initial));
        let watcher_handle = tokio::spawn(watch_document(path.clone(), endpoints, updates_tx));

        Ok(Self {
            path,
            updates_rx: std::sync::Mutex::new(Some(updates_rx)),
            watcher_handle,
        })
    }
}

impl Drop for YamlAuthDataSource {
    fn drop(&mut self) {
        self.watcher_handle.abort();
    }
}

#[async_trait]
impl AuthDataSource for YamlAuthDataSource {
    async fn fetch_auth_data(&self) -> Result<EndpointMap> {
        load_endpoints(&self.path).await
    }

    fn subscribe_updates(&self) -> Option<mpsc::Receiver<AuthDataUpdate>> {
        self.updates_rx.lock().ok()?.take()
    }
}

/// Reads, parses, validates and converts the document.
async fn load_endpoints(path: &Path) -> Result<EndpointMap> {
    let contents = tokio::fs::read_to_string(path).await?;
    let doc: GatewayEndpointsDoc = serde_yaml::from_str(&contents)?;
    doc.validate()?;
    Ok(doc.into_endpoints())
}

/// Watches the document for writes and emits diff-based updates.
async fn watch_document(
    path: PathBuf,
    endpoints: Arc<Mutex<EndpointMap>>,
    updates_tx: mpsc::Sender<AuthDataUpdate>,
) {
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let mut watcher = match RecommendedWatcher::new(
        move |event| {
            let _ = event_tx.blocking_send(event);
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::error!(error = %e, "failed to create file watcher");
            return;
        }
    };

    if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
        tracing::error!(error = %e, path = %path.display(), "failed to watch document");
        return;
    }

    tracing::info!(path = %path.display(), "watching gateway endpoints document");

    while let Some(event_result) = event_rx.recv().await {
        match event_result {
            Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                match load_endpoints(&path).await {
                    Ok(new_endpoints) => {
                        handle_reload(&endpoints, new_endpoints, &updates_tx).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "error loading updated gateway endpoints document");
                    }
                }
            }
            Ok(event) => {
                tracing::debug!(kind = ?event.kind, "ignoring file event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "watcher error");
            }
        }
    }
}

/// Diffs the reloaded map against the previous one and emits updates.
async fn handle_reload(
    endpoints: &Mutex<EndpointMap>,
    new_endpoints: EndpointMap,
    updates_tx: &mpsc::Sender<AuthDataUpdate>,
) {
    let mut current = endpoints.lock().await;

    let updates = diff_endpoints(&current, &new_endpoints);
    let num_updates = updates.len();
    *current = new_endpoints;

    for update in updates {
        if updates_tx.send(update).await.is_err() {
            tracing::debug!("update channel closed, stopping reload emission");
            return;
        }
    }

    tracing::info!(num_updates, "reloaded gateway endpoints document");
}

/// Computes the events a reload implies: an upsert for every entry of the new
/// map (the receiver distinguishes create from update against its own state)
/// and a delete for every id that disappeared.
fn diff_endpoints(old: &EndpointMap, new: &EndpointMap) -> Vec<AuthDataUpdate> {
    let mut updates = Vec::with_capacity(new.len());

    for (endpoint_id, endpoint) in new {
        updates.push(AuthDataUpdate {
            endpoint_id: endpoint_id.clone(),
            gateway_endpoint: Some(endpoint.clone()),
            delete: false,
        });
    }

    for endpoint_id in old.keys() {
        if !new.contains_key(endpoint_id) {
            updates.push(AuthDataUpdate {
                endpoint_id: endpoint_id.clone(),
                gateway_endpoint: None,
                delete: true,
            });
        }
    }

    updates
}
