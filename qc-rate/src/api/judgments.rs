//! Bulk judgment export

use axum::{extract::State, Json};
use qc_common::db::judgments::{list_clicks, list_ratings};
use qc_common::db::{ClickExport, RatingExport};

use crate::error::ApiResult;
use crate::AppState;

/// GET /api/ratings/
pub async fn list_ratings_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<RatingExport>>> {
    Ok(Json(list_ratings(&state.db).await?))
}

/// GET /api/clicks/
pub async fn list_clicks_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<ClickExport>>> {
    Ok(Json(list_clicks(&state.db).await?))
}
