use crate::api::responses::{
    CycleSummary, HealthErrorCode, HealthErrorResponse, HealthStatus, HealthSuccessResponse,
};
use crate::state::{AppState, CycleStatus};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, OffsetDateTime::now_utc())
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: OffsetDateTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return health_internal_error("state lock poisoned while reading run status");
        }
    };
    let status = derive_health_status(&guard);
    let detector_enabled = guard.detector_enabled();
    let roi_enabled = guard.roi_enabled();
    let capture = guard.capture_cycle().copied();
    let roi = guard.roi_cycle().copied();
    let queue_depth = guard.queue_depth();
    drop(guard);

    let (Ok(last_capture), Ok(last_roi_update), Ok(timestamp)) = (
        capture.map(summarize).transpose(),
        roi.map(summarize).transpose(),
        now.format(&Rfc3339),
    ) else {
        return health_internal_error("timestamp formatting failure");
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            detector_enabled,
            roi_enabled,
            last_capture,
            last_roi_update,
            queue_depth,
            timestamp,
        },
    }
}

/// Ko when the last capture cycle got nothing at all, degraded when a stage
/// is switched off or some cameras failed.
fn derive_health_status(state: &AppState) -> HealthStatus {
    let capture = state.capture_cycle().map(|cycle| cycle.report);
    if let Some(report) = capture
        && report.total > 0
        && report.succeeded == 0
    {
        return HealthStatus::Ko;
    }

    let partial_capture = capture.is_some_and(|report| report.failed > 0);
    let partial_roi = state
        .roi_cycle()
        .is_some_and(|cycle| cycle.report.failed > 0);
    if !state.detector_enabled() || !state.roi_enabled() || partial_capture || partial_roi {
        return HealthStatus::Degraded;
    }
    HealthStatus::Ok
}

fn summarize(cycle: CycleStatus) -> Result<CycleSummary, time::error::Format> {
    Ok(CycleSummary {
        total: cycle.report.total,
        succeeded: cycle.report.succeeded,
        failed: cycle.report.failed,
        finished_at: cycle.finished_at.format(&Rfc3339)?,
    })
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(
        message = message,
        "Internal error while handling /api/health"
    );
    let formatted = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());

    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}
