//! Image JSON API
//!
//! Payloads travel base64-encoded in both directions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use qc_common::db::images::{delete_image, find_image_id, get_image, insert_image, list_images};
use qc_common::db::{Image, ImageKey, NewImage};
use qc_common::{DisplayAxis, Step};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    /// Step slug, label or numeric code
    pub name: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub id: i64,
    pub img: String,
    pub slice: Option<i64>,
    pub file1: String,
    pub file2: Option<String>,
    pub display: DisplayAxis,
    pub step: Step,
    pub created_at: DateTime<Utc>,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            img: STANDARD.encode(&image.img),
            slice: image.slice,
            file1: image.file1,
            file2: image.file2,
            display: image.display,
            step: image.step,
            created_at: image.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateImageRequest {
    /// Base64 payload
    pub img: String,
    pub slice: Option<i64>,
    pub file1: String,
    pub file2: Option<String>,
    pub display: DisplayAxis,
    pub step: Step,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// GET /api/images/?name={step}&limit={n}
pub async fn list_images_handler(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Json<Vec<ImageResponse>>> {
    let step = match query.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Some(
            name.parse::<Step>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown step '{}'", name)))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let images = list_images(&state.db, step, limit).await?;
    Ok(Json(images.into_iter().map(ImageResponse::from).collect()))
}

/// POST /api/image/
pub async fn create_image_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateImageRequest>,
) -> ApiResult<(StatusCode, Json<ImageResponse>)> {
    let img = STANDARD
        .decode(request.img.trim())
        .map_err(|e| ApiError::BadRequest(format!("img is not valid base64: {}", e)))?;
    if img.is_empty() {
        return Err(ApiError::BadRequest("img must not be empty".to_string()));
    }

    let new_image = NewImage {
        key: ImageKey {
            slice: request.slice,
            file1: request.file1,
            display: request.display,
            step: request.step,
        },
        file2: request.file2,
        img,
    };

    if let Some(existing) = find_image_id(&state.db, &new_image.key).await? {
        return Err(ApiError::Conflict(format!(
            "Image {} already stored for this slice, file, display and step",
            existing
        )));
    }

    let id = insert_image(&state.db, &new_image).await?;
    info!(image_id = id, step = %new_image.key.step, "Image created via API");

    let image = get_image(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Image {} vanished after insert", id)))?;
    Ok((StatusCode::CREATED, Json(image.into())))
}

/// GET /api/image/{id}/
pub async fn get_image_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ImageResponse>> {
    let image = get_image(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Image {}", id)))?;
    Ok(Json(image.into()))
}

/// DELETE /api/image/{id}/
pub async fn delete_image_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    if !delete_image(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("Image {}", id)));
    }

    info!(image_id = id, "Image deleted via API");
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Image {} deleted", id),
    }))
}
