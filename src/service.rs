//! gRPC request surface: the snapshot read and the update stream subscribe.

use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::catalog::EndpointCatalog;
use crate::hub::UpdateHub;
use crate::proto::gateway_endpoints_server::GatewayEndpoints;
use crate::proto::{AuthDataRequest, AuthDataResponse, AuthDataUpdate, AuthDataUpdatesRequest};

/// Per-subscriber channel capacity. Live sends block when the downstream
/// stops reading this many updates behind.
const STREAM_CHANNEL_CAPACITY: usize = 128;

/// Implements the `GatewayEndpoints` service on top of the catalog and hub.
pub struct AuthDataService {
    catalog: Arc<EndpointCatalog>,
    hub: Arc<UpdateHub>,
}

impl AuthDataService {
    /// Creates the service over a seeded catalog and hub.
    #[must_use]
    pub fn new(catalog: Arc<EndpointCatalog>, hub: Arc<UpdateHub>) -> Self {
        Self { catalog, hub }
    }
}

#[tonic::async_trait]
impl GatewayEndpoints for AuthDataService {
    /// Returns the full catalog. Called by the downstream on startup to warm
    /// up its data store.
    async fn fetch_auth_data_sync(
        &self,
        _request: Request<AuthDataRequest>,
    ) -> Result<Response<AuthDataResponse>, Status> {
        let endpoints = self.catalog.snapshot().await;

        tracing::info!(
            num_gateway_endpoints = endpoints.len(),
            "serving auth data snapshot"
        );

        Ok(Response::new(AuthDataResponse { endpoints }))
    }

    type StreamAuthDataUpdatesStream =
        Pin<Box<dyn Stream<Item = Result<AuthDataUpdate, Status>> + Send + 'static>>;

    /// Attaches the caller as the single update subscriber, replacing any
    /// previous stream. Pending updates are replayed first; live updates
    /// follow until the caller disconnects.
    async fn stream_auth_data_updates(
        &self,
        _request: Request<AuthDataUpdatesRequest>,
    ) -> Result<Response<Self::StreamAuthDataUpdatesStream>, Status> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let session_id = self.hub.attach(tx.clone()).await;

        // When the client goes away tonic drops the receiving half; release
        // the hub slot unless a newer subscriber has already replaced it.
        let hub = self.hub.clone();
        tokio::spawn(async move {
            tx.closed().await;
            hub.detach(&session_id).await;
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamAuthDataUpdatesStream
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EndpointMap;
    use crate::proto::{Auth, CapacityLimitPeriod, GatewayEndpoint, Metadata, RateLimiting};
    use tokio_stream::StreamExt;

    fn seeded_endpoint() -> GatewayEndpoint {
        GatewayEndpoint {
            endpoint_id: "endpoint_1".to_string(),
            auth: Some(Auth::static_api_key("api_key_1")),
            rate_limiting: Some(RateLimiting {
                throughput_limit: 100,
                capacity_limit: 1000,
                capacity_limit_period: CapacityLimitPeriod::Daily.into(),
            }),
            metadata: Some(Metadata {
                account_id: "account_1".to_string(),
                plan_type: "PLAN_FREE".to_string(),
                ..Default::default()
            }),
        }
    }

    async fn seeded_service() -> AuthDataService {
        let catalog = Arc::new(EndpointCatalog::new());
        let mut endpoints = EndpointMap::new();
        endpoints.insert("endpoint_1".to_string(), seeded_endpoint());
        catalog.seed(endpoints).await;

        AuthDataService::new(catalog, Arc::new(UpdateHub::new()))
    }

    #[tokio::test]
    async fn test_fetch_auth_data_sync_returns_seeded_catalog() {
        let service = seeded_service().await;

        let response = service
            .fetch_auth_data_sync(Request::new(AuthDataRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.endpoints.len(), 1);
        assert_eq!(
            response.endpoints.get("endpoint_1"),
            Some(&seeded_endpoint())
        );
    }

    #[tokio::test]
    async fn test_stream_replays_pending_updates() {
        let service = seeded_service().await;

        service
            .hub
            .offer(AuthDataUpdate {
                endpoint_id: "endpoint_2".to_string(),
                gateway_endpoint: None,
                delete: true,
            })
            .await;

        let mut stream = service
            .stream_auth_data_updates(Request::new(AuthDataUpdatesRequest {}))
            .await
            .unwrap()
            .into_inner();

        let update = stream.next().await.unwrap().unwrap();
        assert_eq!(update.endpoint_id, "endpoint_2");
        assert!(update.delete);
    }

    #[tokio::test]
    async fn test_dropped_stream_detaches_hub() {
        let service = seeded_service().await;

        let stream = service
            .stream_auth_data_updates(Request::new(AuthDataUpdatesRequest {}))
            .await
            .unwrap()
            .into_inner();
        drop(stream);

        // The detach task runs once the receiver drop is observed; afterwards
        // offers queue instead of vanishing into a dead channel.
        tokio::task::yield_now().await;
        service
            .hub
            .offer(AuthDataUpdate {
                endpoint_id: "endpoint_3".to_string(),
                gateway_endpoint: None,
                delete: true,
            })
            .await;

        assert_eq!(service.hub.pending_len().await, 1);
    }
}
