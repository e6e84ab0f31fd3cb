//! Local HTTP control API.
//!
//! Provides endpoints for:
//! - Daemon status
//! - Operator commands (start, stop, toggle, auto, manual, pause, quit, reload)
//! - Application logs

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

use crate::recorder::{CommandSlot, StatusHandle};

pub use routes::control::{CommandAccepted, CommandRequest, ControlState};

pub struct ApiServer {
    port: u16,
    control: ControlState,
}

impl ApiServer {
    pub fn new(port: u16, commands: CommandSlot, status: StatusHandle) -> Self {
        Self {
            port,
            control: ControlState { commands, status },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .nest("/logs", routes::logs::router())
            .merge(routes::control::router(self.control.clone()))
            .layer(ServiceBuilder::new())
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        let address = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind control API on {}", address))?;

        info!("API server listening on http://{}", address);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  GET  /status        - Daemon status");
        info!("  POST /command       - Queue a command ({{\"command\": \"start\"}})");
        info!("  POST /<command>     - Queue start|stop|toggle|auto|manual|pause|quit|reload");
        info!("  GET  /logs          - Application logs");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetrec",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "meetrec"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_root_and_version() {
        let server = ApiServer::new(0, CommandSlot::default(), StatusHandle::default());

        let response = server
            .router()
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], "meetrec");

        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
