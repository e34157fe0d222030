//! HTTP surface of the stand-in collaborator.

use axum::{
    extract::multipart::Multipart,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use super::marker;
use crate::client::envelope::{CloakEnvelope, VerifyEnvelope};
use crate::client::service::{CLOAK_PATH, HEALTH_PATH, VERIFY_PATH};
use crate::client::{ProtectionLevel, ProtectionResult};
use crate::codec::data_url;

const FIELD_NAME: &str = "file";
const MARKED_CONFIDENCE: f64 = 0.12;
const UNMARKED_CONFIDENCE: f64 = 0.82;

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, detail: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

/// Router serving both collaborator endpoints and `/health`.
pub fn router() -> Router {
    Router::new()
        .route(CLOAK_PATH, post(cloak_image_handler))
        .route(VERIFY_PATH, post(check_protection_handler))
        .route(HEALTH_PATH, get(health_check))
        .layer(CorsLayer::permissive())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "invisiface-stub",
    }))
}

/// Pull the image part out of the multipart body.
async fn read_image(mut multipart: Multipart) -> Result<(String, Vec<u8>), HandlerError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        reject(
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("image").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(reject(StatusCode::BAD_REQUEST, "File must be an image"));
        }

        let data = field.bytes().await.map_err(|e| {
            reject(
                StatusCode::BAD_REQUEST,
                format!("Failed to read image data: {}", e),
            )
        })?;
        return Ok((file_name, data.to_vec()));
    }

    Err(reject(StatusCode::UNPROCESSABLE_ENTITY, "No image provided"))
}

async fn cloak_image_handler(multipart: Multipart) -> Result<Json<CloakEnvelope>, HandlerError> {
    let (file_name, data) = read_image(multipart).await?;
    info!("📤 Cloak request: {} ({} bytes)", file_name, data.len());

    let marked = marker::embed(&data).map_err(|e| {
        error!("❌ Cloaking failed: {}", e);
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing image: {}", e),
        )
    })?;

    Ok(Json(CloakEnvelope {
        success: true,
        cloaked_image: Some(data_url::format("image/png", &marked)),
        message: Some("Image successfully cloaked".to_string()),
    }))
}

async fn check_protection_handler(
    multipart: Multipart,
) -> Result<Json<VerifyEnvelope>, HandlerError> {
    let (file_name, data) = read_image(multipart).await?;
    info!("🔍 Protection check: {} ({} bytes)", file_name, data.len());

    let marked = marker::detect(&data).map_err(|e| {
        error!("❌ Protection check failed: {}", e);
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error checking protection: {}", e),
        )
    })?;

    let result = if marked {
        ProtectionResult {
            is_protected: true,
            faces_detected: 1,
            confidence_scores: vec![MARKED_CONFIDENCE],
            protection_level: ProtectionLevel::High,
            message: "Excellent protection detected! 1 face(s) found with low recognition confidence."
                .to_string(),
        }
    } else {
        ProtectionResult {
            is_protected: false,
            faces_detected: 1,
            confidence_scores: vec![UNMARKED_CONFIDENCE],
            protection_level: ProtectionLevel::Low,
            message: "Limited protection detected! 1 face(s) found with high recognition confidence."
                .to_string(),
        }
    };

    Ok(Json(VerifyEnvelope::from(result)))
}
