//! services/api/src/web/rest.rs
//!
//! Contains the Axum handler for the profile image upload and the master
//! definition for the OpenAPI specification.

use crate::adapters::images::extension_of;
use crate::error::{ErrorResponse, UploadError};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, State},
    response::Json,
};
use bytes::BytesMut;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_profile_image,
    ),
    components(
        schemas(UploadResponse, ErrorResponse)
    ),
    tags(
        (name = "Study Tracker Uploads", description = "Profile image uploads for the study tracker.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after an image was stored.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    success: bool,
    /// Public path of the stored image, e.g. `/assets/teachers/u1_1700000000000.png`.
    image_url: String,
    filename: String,
}

/// The `image` part of the form once it has been read in full.
struct ImagePart {
    extension: String,
    bytes: BytesMut,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a profile image.
///
/// Accepts a multipart/form-data request with an `image` file part and an
/// optional `userId` text part, in any order.
#[utoipa::path(
    post,
    path = "/api/upload-profile-image",
    request_body(content_type = "multipart/form-data", description = "`image` file plus optional `userId`."),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "No file in the form", body = ErrorResponse),
        (status = 500, description = "Not an image, too large, or not storable", body = ErrorResponse)
    )
)]
pub async fn upload_profile_image(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    let limit = app_state.config.max_upload_bytes;
    let mut user_id: Option<String> = None;
    let mut image: Option<ImagePart> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("userId") => {
                let value = field.text().await?;
                user_id = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            Some("image") => {
                let extension = extension_of(field.file_name().unwrap_or_default());
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !app_state.images.accepts(&extension, &content_type) {
                    return Err(UploadError::NotAnImage);
                }

                let mut bytes = BytesMut::new();
                while let Some(chunk) = field.chunk().await? {
                    if bytes.len() + chunk.len() > limit {
                        return Err(UploadError::TooLarge);
                    }
                    bytes.extend_from_slice(&chunk);
                }
                image = Some(ImagePart { extension, bytes });
            }
            _ => continue,
        }
    }

    let image = image.ok_or(UploadError::MissingFile)?;
    let stored = app_state
        .images
        .save(user_id.as_deref(), &image.extension, &image.bytes)
        .await?;
    info!(filename = %stored.filename, user_id = ?user_id, "profile image uploaded");

    Ok(Json(UploadResponse {
        success: true,
        image_url: stored.url,
        filename: stored.filename,
    }))
}
