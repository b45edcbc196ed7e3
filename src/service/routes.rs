//! Axum routes for the variable dependency service.

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::augmenter::AugmentError;
use crate::catalog::CatalogLoadError;
use crate::store::GraphStore;
use crate::types::{DatasetId, RequestedVariableSet, VariableDescriptor};
use crate::VARIABLE_KERNEL_SCHEMA_VERSION;

use super::middleware::{metrics_middleware, record_augment_metrics, record_catalog_reload};
use super::state::{CatalogSummary, ReloadError, ServiceState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to augment a variable list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentRequest {
    /// Requested variables, possibly spanning datasets.
    pub variables: Vec<VariableDescriptor>,
}

/// Augmented variable list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentResponse {
    /// Requested variables followed by appended requirements.
    pub variables: Vec<VariableDescriptor>,
    /// Number of distinct requested variables.
    pub requested: usize,
    /// Number of appended variables.
    pub added: usize,
    /// Schema version.
    pub schema_version: String,
}

/// Loaded catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogListResponse {
    pub catalogs: Vec<CatalogSummary>,
    pub registry_fingerprint: String,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: String,
    pub catalog_count: usize,
    pub registry_fingerprint: String,
    /// Whether the graph store answered.
    pub store_healthy: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub store: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, body: ErrorResponse) -> ApiError {
    tracing::warn!(
        status = status.as_u16(),
        code = %body.code,
        error = %body.error,
        "Request error"
    );
    (status, Json(body))
}

impl From<AugmentError> for ApiError {
    fn from(e: AugmentError) -> Self {
        match e {
            AugmentError::InvalidRequest(inner) => api_error(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("INVALID_REQUEST", inner.to_string()),
            ),
            AugmentError::StoreUnavailable(msg) => api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("STORE_UNAVAILABLE", "Graph store unavailable").with_details(msg),
            ),
        }
    }
}

impl From<ReloadError> for ApiError {
    fn from(e: ReloadError) -> Self {
        match e {
            ReloadError::NoSource => api_error(
                StatusCode::CONFLICT,
                ErrorResponse::new("NO_CATALOG_SOURCE", e.to_string()),
            ),
            ReloadError::Load(CatalogLoadError::Integrity(inner)) => api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("CATALOG_INTEGRITY", "Catalog rejected; previous catalogs kept")
                    .with_details(inner.to_string()),
            ),
            ReloadError::Load(other) => api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("CATALOG_INTEGRITY", "Catalog unreadable; previous catalogs kept")
                    .with_details(other.to_string()),
            ),
            ReloadError::Store(msg) => api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("STORE_UNAVAILABLE", "Graph store unavailable").with_details(msg),
            ),
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Append transitively required variables to a request.
async fn augment_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    payload: Result<Json<AugmentRequest>, JsonRejection>,
) -> Result<Json<AugmentResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        api_error(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("INVALID_REQUEST", "Malformed augment request")
                .with_details(rejection.body_text()),
        )
    })?;

    let start = Instant::now();
    let request = RequestedVariableSet::new(request.variables);
    let augmented = state.augmenter.augment(&request).await?;

    record_augment_metrics(
        augmented.requested_count(),
        augmented.added_count(),
        request.datasets().len(),
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(AugmentResponse {
        requested: augmented.requested_count(),
        added: augmented.added_count(),
        variables: augmented.into_variables(),
        schema_version: VARIABLE_KERNEL_SCHEMA_VERSION.to_string(),
    }))
}

/// List loaded catalogs.
async fn list_catalogs_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Json<CatalogListResponse> {
    let registry = state.registry.read();
    Json(CatalogListResponse {
        catalogs: registry.list(),
        registry_fingerprint: registry.fingerprint().to_string(),
    })
}

/// Describe one catalog.
async fn get_catalog_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<CatalogSummary>, ApiError> {
    let registry = state.registry.read();
    registry
        .get(&DatasetId::new(dataset_id.clone()))
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                ErrorResponse::new("DATASET_NOT_FOUND", format!("Dataset not loaded: {}", dataset_id)),
            )
        })
}

/// Re-read catalog definitions and install them.
async fn reload_catalogs_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Result<Json<CatalogListResponse>, ApiError> {
    match state.reload().await {
        Ok(catalogs) => {
            record_catalog_reload(true, catalogs.len());
            let registry_fingerprint = state.registry.read().fingerprint().to_string();
            Ok(Json(CatalogListResponse {
                catalogs,
                registry_fingerprint,
            }))
        }
        Err(e) => {
            record_catalog_reload(false, state.registry.read().len());
            Err(e.into())
        }
    }
}

/// Health check endpoint (detailed).
async fn health_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Json<HealthResponse> {
    // Release the registry lock before awaiting the store
    let (catalog_count, registry_fingerprint) = {
        let registry = state.registry.read();
        (registry.len(), registry.fingerprint().to_string())
    };

    let store_healthy = state.store.is_healthy().await;

    Json(HealthResponse {
        status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: VARIABLE_KERNEL_SCHEMA_VERSION.to_string(),
        catalog_count,
        registry_fingerprint,
        store_healthy,
    })
}

/// Liveness probe endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the graph store answers, 503 otherwise.
async fn readiness_handler<S: GraphStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> impl IntoResponse {
    if state.store.is_healthy().await {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                store: true,
                details: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Graph store unavailable".to_string()),
            }),
        )
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the variable dependency service.
pub fn create_router<S: GraphStore + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/augment", post(augment_handler::<S>))
        // Catalog management
        .route("/api/catalogs", get(list_catalogs_handler::<S>))
        .route("/api/catalogs/reload", post(reload_catalogs_handler::<S>))
        .route("/api/catalogs/:dataset_id", get(get_catalog_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::catalog::CatalogSet;
    use crate::store::InMemoryGraphStore;

    const CATALOG: &str = r#"{"id": "science", "name": "Science",
        "variables": [
            {"id": "rain", "name": "/rainfall_rate"},
            {"id": "lat", "name": "/latitude"},
            {"id": "lon", "name": "/longitude"},
            {"id": "time", "name": "/time"}
        ],
        "edges": [
            {"origin": "rain", "destination": "lat"},
            {"origin": "rain", "destination": "lon"},
            {"origin": "rain", "destination": "time"}
        ]}"#;

    async fn test_router() -> (Router, Arc<InMemoryGraphStore>) {
        let state = ServiceState::new(InMemoryGraphStore::new());
        let set = CatalogSet::from_json_str(CATALOG).unwrap();
        state.install(&set).await.unwrap();
        let store = Arc::clone(&state.store);
        (create_router(state), store)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_augment_appends_requirements() {
        let (router, _) = test_router().await;
        let (status, body) = send(
            router,
            post_json("/api/augment", r#"{"variables": [{"dataset_id": "science", "variable_id": "rain"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requested"], 1);
        assert_eq!(body["added"], 3);
        let ids: Vec<&str> = body["variables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["variable_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["rain", "lat", "lon", "time"]);
    }

    #[tokio::test]
    async fn test_augment_missing_id_is_bad_request() {
        let (router, _) = test_router().await;
        let (status, body) = send(
            router,
            post_json("/api/augment", r#"{"variables": [{"dataset_id": "science"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_augment_malformed_json_is_bad_request() {
        let (router, _) = test_router().await;
        let (status, body) = send(router, post_json("/api/augment", "{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_augment_store_offline_is_unavailable() {
        let (router, store) = test_router().await;
        store.set_offline(true);
        let (status, body) = send(
            router,
            post_json("/api/augment", r#"{"variables": [{"dataset_id": "science", "variable_id": "rain"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "STORE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_list_and_get_catalogs() {
        let (router, _) = test_router().await;
        let (status, body) = send(
            router.clone(),
            Request::get("/api/catalogs").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["catalogs"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            router.clone(),
            Request::get("/api/catalogs/science").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["variable_count"], 4);
        assert_eq!(body["edge_count"], 3);

        let (status, body) = send(
            router,
            Request::get("/api/catalogs/missing").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "DATASET_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reload_without_source_conflicts() {
        let (router, _) = test_router().await;
        let (status, body) = send(router, post_json("/api/catalogs/reload", "")).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "NO_CATALOG_SOURCE");
    }

    #[tokio::test]
    async fn test_health_probes() {
        let (router, store) = test_router().await;
        let (status, body) = send(
            router.clone(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["catalog_count"], 1);

        let (status, _) = send(
            router.clone(),
            Request::get("/health/live").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        store.set_offline(true);
        let (status, body) = send(
            router,
            Request::get("/health/ready").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }
}
