//! The in-memory gateway endpoint catalog.
//!
//! The catalog is the single authoritative view of all gateway endpoints for
//! the lifetime of the process. It is seeded from the data source snapshot at
//! boot and mutated only by the update pipe; snapshot requests take a shared
//! read lock.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::proto::{AuthDataUpdate, GatewayEndpoint};

/// Mapping of endpoint id to gateway endpoint record.
pub type EndpointMap = HashMap<String, GatewayEndpoint>;

/// Concurrently readable mapping of endpoint id to gateway endpoint.
#[derive(Default)]
pub struct EndpointCatalog {
    endpoints: RwLock<EndpointMap>,
}

impl EndpointCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalog contents with the data source snapshot.
    pub async fn seed(&self, endpoints: EndpointMap) {
        let mut guard = self.endpoints.write().await;
        *guard = endpoints;
    }

    /// Returns a consistent copy of the full catalog.
    pub async fn snapshot(&self) -> EndpointMap {
        self.endpoints.read().await.clone()
    }

    /// Applies a single create/update/delete event to the catalog.
    pub async fn apply(&self, update: &AuthDataUpdate) {
        let mut endpoints = self.endpoints.write().await;

        if update.delete {
            endpoints.remove(&update.endpoint_id);
            tracing::info!(endpoint_id = %update.endpoint_id, "deleted gateway endpoint");
            return;
        }

        let Some(endpoint) = &update.gateway_endpoint else {
            tracing::warn!(
                endpoint_id = %update.endpoint_id,
                "update carried no endpoint payload, skipping"
            );
            return;
        };

        if endpoints.contains_key(&update.endpoint_id) {
            tracing::info!(endpoint_id = %update.endpoint_id, "updated gateway endpoint");
        } else {
            tracing::info!(endpoint_id = %update.endpoint_id, "created gateway endpoint");
        }
        endpoints.insert(update.endpoint_id.clone(), endpoint.clone());
    }

    /// Number of endpoints currently in the catalog.
    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    /// True when the catalog holds no endpoints.
    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }
}
