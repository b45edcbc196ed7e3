//! Variable Dependency REST Service
//!
//! Exposes augmentation and catalog management over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/augment` - Append transitively required variables to a request
//! - `GET /api/catalogs` - List loaded catalogs
//! - `GET /api/catalogs/:dataset_id` - Describe one catalog
//! - `POST /api/catalogs/reload` - Re-read catalog definitions from disk
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{
    metrics_middleware, record_augment_metrics, record_catalog_reload, request_logging_middleware,
};
pub use routes::create_router;
pub use state::{CatalogRegistry, CatalogSummary, ReloadError, ServiceState};
