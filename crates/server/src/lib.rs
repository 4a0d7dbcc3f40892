//! HTTP service for plinth static-site hosting.
//!
//! This crate wires the pipeline together:
//! - Upload ingestion (validate, extract, allocate, persist, reload)
//! - Site listing, rename and delete with storage/record compensation
//! - Admin endpoints for users and tokens
//! - Routing reload hook and background scratch sweeping

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod routing;
pub mod sites;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use routing::{CommandReloader, NoopReloader, RouteReloader};
pub use sites::{Actor, IdentifierAllocator, Ingestor, SiteError, SiteLifecycle};
pub use state::AppState;
