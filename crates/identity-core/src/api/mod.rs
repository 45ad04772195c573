//! REST surface for identity and token issuance
//!
//! Two endpoints, matching what the browser client calls:
//!
//! - `GET /api/user/identity` -> plain-text identity handle
//! - `GET /api/user/token` -> plain-text access token
//!
//! Neither endpoint authenticates its caller; anyone who can reach the
//! service can mint tokens for its identities. Deploy behind a trusted
//! front door.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::error::IdentityError;
use crate::service::IdentityService;

/// Build the API router.
///
/// CORS is wide open because the demo front end is served from a different
/// origin during development.
pub fn router(service: Arc<IdentityService>) -> Router {
    Router::new()
        .route("/api/user/identity", get(get_identity))
        .route("/api/user/token", get(get_token))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(service)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<S>(
    listener: tokio::net::TcpListener,
    service: Arc<IdentityService>,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn get_identity(State(service): State<Arc<IdentityService>>) -> Result<String, ApiError> {
    let identity = service.get_identity().await?;
    Ok(identity.to_string())
}

async fn get_token(State(service): State<Arc<IdentityService>>) -> Result<String, ApiError> {
    let token = service.get_token().await?;
    Ok(token.token)
}

/// Maps service errors onto HTTP statuses.
struct ApiError(IdentityError);

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IdentityError::UpstreamUnavailable(_) | IdentityError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(status = %status, "request failed: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}
