//! Control API failures and their JSON bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::recorder::DaemonCommand;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request named something that is not a daemon command.
    #[error("unknown command '{given}'")]
    UnknownCommand { given: String },
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unknown_command(given: &str) -> Self {
        Self::UnknownCommand {
            given: given.trim().to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownCommand { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": true,
            "code": status.as_u16(),
            "message": self.to_string(),
        });
        if matches!(self, Self::UnknownCommand { .. }) {
            body["valid_commands"] = json!(DaemonCommand::ALL.map(|c| c.as_str()));
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
