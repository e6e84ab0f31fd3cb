//! Status and command endpoints.
//!
//! Commands are not executed here. They are deposited in the command slot and
//! picked up by the poll loop on its next tick.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::recorder::{CommandSlot, DaemonCommand, StatusHandle, StatusSnapshot};

#[derive(Clone)]
pub struct ControlState {
    pub commands: CommandSlot,
    pub status: StatusHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAccepted {
    pub accepted: DaemonCommand,
    /// Unconsumed command this one replaced.
    pub replaced: Option<DaemonCommand>,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/command", post(command_body))
        .route("/:command", post(command_path))
        .with_state(state)
}

async fn status(State(state): State<ControlState>) -> Json<StatusSnapshot> {
    Json(state.status.get().await)
}

async fn command_body(
    State(state): State<ControlState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandAccepted>> {
    submit(&state, &request.command)
}

async fn command_path(
    State(state): State<ControlState>,
    Path(command): Path<String>,
) -> ApiResult<Json<CommandAccepted>> {
    submit(&state, &command)
}

fn submit(state: &ControlState, raw: &str) -> ApiResult<Json<CommandAccepted>> {
    let command: DaemonCommand = raw.parse().map_err(|_| ApiError::unknown_command(raw))?;
    let replaced = state.commands.put(command);
    match replaced {
        Some(previous) => info!("Queued command {} (replaced pending {})", command, previous),
        None => info!("Queued command {}", command),
    }
    Ok(Json(CommandAccepted {
        accepted: command,
        replaced,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> ControlState {
        ControlState {
            commands: CommandSlot::default(),
            status: StatusHandle::default(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_command_path_queues() {
        let state = state();
        let app = router(state.clone());
        let response = app
            .oneshot(Request::post("/toggle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["accepted"], "toggle");
        assert_eq!(state.commands.take(), Some(DaemonCommand::Toggle));
    }

    #[tokio::test]
    async fn test_post_command_body_replaces_pending() {
        let state = state();
        state.commands.put(DaemonCommand::Start);
        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::post("/command")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"command":"stop"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["accepted"], "stop");
        assert_eq!(body["replaced"], "start");
        assert_eq!(state.commands.take(), Some(DaemonCommand::Stop));
    }

    #[tokio::test]
    async fn test_unknown_command_is_bad_request() {
        let state = state();
        let app = router(state.clone());
        let response = app
            .oneshot(Request::post("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["message"], "unknown command 'explode'");
        assert_eq!(state.commands.take(), None);
    }

    #[tokio::test]
    async fn test_get_status_returns_snapshot() {
        let app = router(state());
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mode"], "auto");
        assert_eq!(body["recording_state"], "idle");
    }
}
