use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    domain::{
        shared::usage_dto::UsageResponse,
        tts::{NarrationOutcome, NarrationRequest, NarrationServiceApi},
        usage::Pricing,
    },
    error::{AppError, AppResult},
    infrastructure::{http::RequestId, repositories::IndexedItem},
};

/// Response for GET /api/tts/items
#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<IndexedItem>,
    pub total: usize,
}

pub struct TtsController {
    narration_service: Arc<dyn NarrationServiceApi>,
    pricing: Pricing,
}

impl TtsController {
    pub fn new(narration_service: Arc<dyn NarrationServiceApi>, pricing: Pricing) -> Self {
        Self {
            narration_service,
            pricing,
        }
    }

    /// POST /api/tts/narrate - Narrate an item, or return its existing audio
    pub async fn narrate(
        State(controller): State<Arc<TtsController>>,
        Extension(request_id): Extension<RequestId>,
        Json(request): Json<NarrationRequest>,
    ) -> AppResult<Json<NarrationOutcome>> {
        if request.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".to_string()));
        }
        if request.text.trim().is_empty() {
            return Err(AppError::BadRequest("Text cannot be empty".to_string()));
        }

        tracing::info!(
            request_id = %request_id.0,
            title = %request.title,
            source = ?request.source,
            text_length = request.text.len(),
            "Narration request"
        );

        let outcome = controller
            .narration_service
            .narrate(request)
            .await
            .map_err(AppError::from)?;

        Ok(Json(outcome))
    }

    /// GET /api/tts/usage - Current month and lifetime usage
    pub async fn get_usage(
        State(controller): State<Arc<TtsController>>,
    ) -> AppResult<Json<UsageResponse>> {
        let snapshot = controller
            .narration_service
            .usage_stats()
            .await
            .map_err(AppError::from)?;

        Ok(Json(UsageResponse::new(snapshot, &controller.pricing, Utc::now())))
    }

    /// GET /api/tts/items - Processed items, newest first
    pub async fn list_items(
        State(controller): State<Arc<TtsController>>,
    ) -> AppResult<Json<ItemsResponse>> {
        let items = controller
            .narration_service
            .list_items()
            .await
            .map_err(AppError::from)?;

        Ok(Json(ItemsResponse {
            total: items.len(),
            items,
        }))
    }
}
