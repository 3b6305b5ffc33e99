use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::error::AppResult;
use crate::infrastructure::repositories::{IndexRepository, UsageRepository};

/// Dependencies probed by the readiness check
pub struct HealthState {
    index_repo: Arc<dyn IndexRepository>,
    usage_repo: Arc<dyn UsageRepository>,
    tts_provider: &'static str,
}

impl HealthState {
    pub fn new(
        index_repo: Arc<dyn IndexRepository>,
        usage_repo: Arc<dyn UsageRepository>,
        tts_provider: &'static str,
    ) -> Self {
        Self {
            index_repo,
            usage_repo,
            tts_provider,
        }
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn health_ready(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let (index, ledger) = tokio::join!(state.index_repo.ping(), state.usage_repo.ping());

    if let Err(e) = &index {
        tracing::warn!(error = %e, "Index store not reachable");
    }
    if let Err(e) = &ledger {
        tracing::warn!(error = %e, "Usage ledger not reachable");
    }

    let status = |result: &AppResult<()>| {
        if result.is_ok() {
            "connected"
        } else {
            "disconnected"
        }
    };
    let ready = index.is_ok() && ledger.is_ok();

    (
        if ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "index": status(&index),
            "ledger": status(&ledger),
            "tts": state.tts_provider
        })),
    )
}
