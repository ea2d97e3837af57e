//! # Auth Data Server
//!
//! This crate provides a gRPC server that distributes gateway endpoint auth
//! data (authorization, rate limiting and metadata records) to a downstream
//! external authorization server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │  Data source    │────►│ Auth Data Server │────►│ External authz   │
//! │ (YAML/Postgres) │     │   (this crate)   │     │     server       │
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!         │                        ▲
//!         │ file watch /           │ gRPC snapshot + update stream
//!         │ pg_notify              │
//!         └────────────────────────┘
//! ```
//!
//! At boot the configured data source produces a full snapshot that seeds the
//! in-memory catalog. The update pipe then consumes the source's change
//! events for the lifetime of the process, applying each to the catalog and
//! handing it to the subscriber hub. The hub either forwards events to the
//! single attached update stream or queues them until the next stream
//! attaches, so no event is lost across downstream reconnects.
//!
//! ## Endpoints
//!
//! - `FetchAuthDataSync` — full catalog snapshot (gRPC unary)
//! - `StreamAuthDataUpdates` — create/update/delete events (gRPC server stream)
//! - `GET /healthz` — plaintext health probe on the same port

pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod pipe;
pub mod proto;
pub mod server;
pub mod service;
pub mod source;

pub use catalog::EndpointCatalog;
pub use error::{Result, ServerError};
pub use hub::UpdateHub;
