//! The update pipe: the single consumer of a data source's event channel.
//!
//! Each event is applied to the catalog and then handed to the hub, in the
//! order the data source emitted it. The pipe is the sole writer to the
//! catalog.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::catalog::EndpointCatalog;
use crate::hub::UpdateHub;
use crate::proto::AuthDataUpdate;

/// Drains the data source update channel until it closes at shutdown.
pub async fn run_update_pipe(
    catalog: Arc<EndpointCatalog>,
    hub: Arc<UpdateHub>,
    mut updates: mpsc::Receiver<AuthDataUpdate>,
) {
    while let Some(update) = updates.recv().await {
        catalog.apply(&update).await;
        hub.offer(update).await;
    }

    tracing::info!("data source update channel closed, update pipe exiting");
}
