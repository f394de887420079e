//! HTTP signaling surface
//!
//! Two endpoints drive the relay:
//! - POST /webrtc/open - body is the encoded offer, response body the
//!   encoded answer
//! - POST /webrtc/close - tears the active session down
//!
//! Request errors (bad payload, nothing to relay, lifecycle misuse) come
//! back as 400 with a plain-text reason; anything else is a 500. A health
//! endpoint is exposed for probes.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use crate::{Error, Result, SessionManager};

/// HTTP server state shared across handlers
#[derive(Clone)]
struct ServerState {
    manager: Arc<SessionManager>,
}

/// HTTP front end for the relay
pub struct RelayHttpServer {
    /// Server bind address
    bind_address: String,
    /// Shared server state
    state: ServerState,
}

impl RelayHttpServer {
    /// Create a new HTTP server for the given session manager.
    ///
    /// # Arguments
    ///
    /// * `bind_address` - Address to bind to (e.g., "127.0.0.1:8000")
    /// * `manager` - Session manager handling open/close requests
    pub fn new(bind_address: String, manager: Arc<SessionManager>) -> Self {
        Self {
            bind_address,
            state: ServerState { manager },
        }
    }

    /// Build the router with all endpoints
    fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/webrtc/open", post(open_handler))
            .route("/webrtc/close", post(close_handler))
            .with_state(self.state.clone())
            .layer(
                tower::ServiceBuilder::new()
                    .layer(tower_http::trace::TraceLayer::new_for_http())
                    .layer(tower_http::cors::CorsLayer::permissive()),
            )
    }

    /// Start the HTTP server.
    ///
    /// This method blocks until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server and stop accepting connections once `shutdown`
    /// completes.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr: std::net::SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid bind address: {}", e)))?;

        tracing::info!("relay signaling server listening on {}", addr);

        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Map relay errors onto HTTP responses with a plain-text reason
fn map_relay_error(e: Error) -> (StatusCode, String) {
    if e.is_request_error() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        tracing::error!(error = %e, "relay request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// Health check endpoint
async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// POST /webrtc/open - negotiate a session from the offer in the body
async fn open_handler(
    State(state): State<ServerState>,
    body: String,
) -> std::result::Result<String, (StatusCode, String)> {
    state.manager.open(&body).await.map_err(map_relay_error)
}

/// POST /webrtc/close - tear down the active session
async fn close_handler(
    State(state): State<ServerState>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    state
        .manager
        .close()
        .await
        .map(|_| StatusCode::OK)
        .map_err(map_relay_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayConfig;

    fn state() -> ServerState {
        ServerState {
            manager: Arc::new(SessionManager::new(RelayConfig::default())),
        }
    }

    #[tokio::test]
    async fn test_health_handler() {
        assert_eq!(health_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_open_rejects_garbage_payload_with_400() {
        let (status, reason) = open_handler(State(state()), "garbage".to_string())
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reason.contains("malformed signaling payload"));
    }

    #[tokio::test]
    async fn test_close_without_session_is_400() {
        let (status, reason) = close_handler(State(state())).await.unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reason.contains("no relay session"));
    }

    #[test]
    fn test_router_builds() {
        let server = RelayHttpServer::new(
            "127.0.0.1:0".to_string(),
            Arc::new(SessionManager::new(RelayConfig::default())),
        );
        let _router = server.build_router();
    }
}
