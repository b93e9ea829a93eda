//! Operator admin API.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness and number of running loops |
//! | GET | `/api/v1/deployments` | Deployments with a running loop |
//! | GET | `/api/v1/deployments/{name}` | Spec, status and version |
//! | GET | `/api/v1/deployments/{name}/plan` | Persisted plan |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;

use tessera_state::{DeploymentPhase, DeploymentSpec, DeploymentStatus, StateError};

use crate::operator::Operator;

#[derive(Clone)]
pub struct ApiState {
    pub operator: Arc<Operator>,
}

pub fn build_router(operator: Arc<Operator>) -> Router {
    let state = ApiState { operator };

    let api_routes = Router::new()
        .route("/deployments", get(list_deployments))
        .route("/deployments/{name}", get(get_deployment))
        .route("/deployments/{name}/plan", get(get_plan))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(healthz).with_state(state))
        .nest("/api/v1", api_routes)
}

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn state_error_response(err: StateError) -> axum::response::Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(&err.to_string(), status).into_response()
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    deployments: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSummary {
    name: String,
    phase: DeploymentPhase,
    members: usize,
    planned_actions: usize,
}

#[derive(Serialize)]
struct DeploymentView {
    name: String,
    version: String,
    spec: DeploymentSpec,
    status: DeploymentStatus,
}

/// GET /healthz
async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(Health {
        status: "ok",
        deployments: state.operator.active_deployments().await.len(),
    })
}

/// GET /api/v1/deployments
async fn list_deployments(State(state): State<ApiState>) -> impl IntoResponse {
    let store = state.operator.store();
    let mut summaries = Vec::new();
    for name in state.operator.active_deployments().await {
        match store.read(&name).await {
            Ok(current) => summaries.push(DeploymentSummary {
                members: current.status.members.iter().count(),
                planned_actions: current.status.plan.len(),
                phase: current.status.phase,
                name,
            }),
            // Deleted since the last discovery.
            Err(e) if e.is_not_found() => {}
            Err(e) => return state_error_response(e),
        }
    }
    ApiResponse::ok(summaries).into_response()
}

/// GET /api/v1/deployments/{name}
async fn get_deployment(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.operator.store().read(&name).await {
        Ok(current) => ApiResponse::ok(DeploymentView {
            name,
            version: current.version,
            spec: current.spec,
            status: current.status,
        })
        .into_response(),
        Err(e) => state_error_response(e),
    }
}

/// GET /api/v1/deployments/{name}/plan
async fn get_plan(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.operator.store().read(&name).await {
        Ok(current) => ApiResponse::ok(current.status.plan).into_response(),
        Err(e) => state_error_response(e),
    }
}
