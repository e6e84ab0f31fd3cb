//! Logs API routes.

use anyhow::Context;

use crate::api::error::ApiResult;
use crate::logs::{self, LogsOptions, LogsResult};
use axum::{extract::Query, response::Json, routing::get, Router};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct LogsQueryParams {
    /// Number of log entries (default 30)
    pub lines: Option<usize>,
    /// Only structured diagnostic entries
    #[serde(default)]
    pub diagnostics: bool,
}

pub fn router() -> Router {
    Router::new().route("/", get(get_logs))
}

/// GET /logs
async fn get_logs(Query(params): Query<LogsQueryParams>) -> ApiResult<Json<LogsResult>> {
    let options = LogsOptions {
        lines: params.lines.unwrap_or(30),
        diagnostics_only: params.diagnostics,
    };
    let result = tokio::task::spawn_blocking(move || logs::get_logs(&options))
        .await
        .context("Log reader task failed")??;
    Ok(Json(result))
}
