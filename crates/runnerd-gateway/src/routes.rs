//! API route handlers for the gateway.
//!
//! Each handler forwards to the registry and maps the resulting error
//! kind to a transport status code; the core stays transport-agnostic.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use runnerd_core::Error;
use runnerd_supervisor::LaunchMode;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub name: String,
    pub path: String,
    pub mode: LaunchMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleRequest {
    pub name: String,
    /// Unix timestamp or RFC1123 string.
    pub at: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub rule: String,
}

/// Map an error kind to its transport status code.
pub(crate) fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::DuplicateName(_) | Error::DuplicateRule(_) => StatusCode::CONFLICT,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidTimeFormat(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::AlreadyRunning { .. }
        | Error::NotRunning(_)
        | Error::ScheduledProcess(_)
        | Error::NotSchedulable(_)
        | Error::NoTimingConfigured(_) => StatusCode::CONFLICT,
        Error::Launch { .. }
        | Error::Termination { .. }
        | Error::CorruptState { .. }
        | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> Response {
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}

pub(crate) fn plain_error(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "error": message }))).into_response()
}

pub async fn list_processes(State(state): State<Arc<AppState>>) -> Response {
    Json(state.registry.list()).into_response()
}

pub async fn add_process(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRequest>,
) -> Response {
    match state.registry.add(&req.name, &req.path, req.mode) {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn process_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.get(&name) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn start_process(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<StartRequest>>,
) -> Response {
    let Json(req) = body.unwrap_or_default();
    match state.registry.start(&name, &req.args) {
        Ok(pid) => Json(json!({ "message": "process started", "pid": pid })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn stop_process(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.stop(&name) {
        Ok(()) => Json(json!({ "message": "process stopped" })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn remove_process(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.remove(&name) {
        Ok(()) => Json(json!({ "message": "process removed" })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RuleRequest>,
) -> Response {
    match state.registry.create_timing_rule(&req.name, &req.at) {
        Ok(rule) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "timing rule created",
                "name": rule.name,
                "trigger_time": rule.trigger_time,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn assign_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Response {
    match state.registry.assign_job(&name, &req.rule) {
        Ok(()) => Json(json!({ "message": "job assigned" })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn start_job(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match Arc::clone(&state.registry).start_job(&name) {
        Ok(()) => Json(json!({ "message": "job started" })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_job(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.registry.delete_job(&name) {
        Ok(()) => Json(json!({ "message": "job deleted" })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&Error::DuplicateName("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::NotFound("process 'x'".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::InvalidTimeFormat("soon".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::NotRunning("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::Launch {
                name: "x".into(),
                source: std::io::Error::other("boom"),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_start_request_defaults() {
        let req: StartRequest = serde_json::from_str("{}").unwrap();
        assert!(req.args.is_empty());
        let req: StartRequest = serde_json::from_str(r#"{"args":["-v"]}"#).unwrap();
        assert_eq!(req.args, vec!["-v".to_string()]);
    }
}
