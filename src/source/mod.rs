//! Backing data sources for gateway endpoint auth data.
//!
//! A data source produces a full snapshot at boot and a channel of
//! create/update/delete events for the lifetime of the process. Two variants
//! exist: a watched YAML document and a portal PostgreSQL database consumed
//! through its change log.

pub mod postgres;
pub mod yaml;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::catalog::EndpointMap;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::proto::AuthDataUpdate;

pub use postgres::PostgresAuthDataSource;
pub use yaml::YamlAuthDataSource;

/// Capacity of the adapter-to-pipe update channel. Sends block when full,
/// which is acceptable back-pressure on the adapter.
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 100_000;

/// A backing source of gateway endpoint auth data.
#[async_trait]
pub trait AuthDataSource: Send + Sync {
    /// Fetches the full set of gateway endpoints from the backing source.
    async fn fetch_auth_data(&self) -> Result<EndpointMap>;

    /// Takes the receiving half of the source's update channel.
    ///
    /// Returns `Some` exactly once; the update pipe is the single consumer.
    fn subscribe_updates(&self) -> Option<mpsc::Receiver<AuthDataUpdate>>;
}

/// Builds the configured data source variant.
pub async fn build_data_source(config: &SourceConfig) -> Result<Box<dyn AuthDataSource>> {
    match config {
        SourceConfig::Yaml(path) => {
            tracing::info!(path = %path.display(), "using YAML data source");
            Ok(Box::new(YamlAuthDataSource::load(path.clone()).await?))
        }
        SourceConfig::Postgres(connection_string) => {
            tracing::info!("using Postgres data source");
            Ok(Box::new(
                PostgresAuthDataSource::connect(connection_string).await?,
            ))
        }
    }
}
