//! Product image uploads.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    routing::post,
};
use tracing::instrument;

use mypeteats_core::Capability;

use crate::error::AppError;
use crate::middleware::RequireStaff;
use crate::services::uploads::{MAX_IMAGE_BYTES, UploadOutcome, UploadedFile};
use crate::state::AppState;

/// Files per request.
const MAX_FILES: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/upload-image", post(upload))
        // Room for a full batch plus multipart framing.
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES * MAX_FILES + 64 * 1024))
}

fn multipart_error(e: &MultipartError) -> AppError {
    AppError::BadRequest(format!("Failed to parse upload: {}", e.body_text()))
}

/// Store every file part of a multipart request. Non-file fields are
/// ignored.
#[instrument(skip_all, fields(principal = principal.kind()))]
pub async fn upload(
    State(state): State<AppState>,
    RequireStaff(principal): RequireStaff,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, AppError> {
    principal.require(Capability::UploadMedia)?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if field.file_name().is_none() {
            continue;
        }
        if files.len() == MAX_FILES {
            return Err(AppError::BadRequest(format!(
                "At most {MAX_FILES} files can be uploaded at once"
            )));
        }
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(|e| multipart_error(&e))?;
        files.push(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    let outcome = state.uploads().store(files).await?;
    tracing::info!(?outcome, "Images uploaded");
    Ok(Json(outcome))
}
