//! Caption edits, deletion, and authenticated image serving.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tower_sessions::Session;
use tracing::info;

use crate::AppState;
use crate::auth::require_user;
use crate::error::ApiError;
use crate::photos::PhotoResponse;
use crate::storage::{DERIVATIVE_EXTENSION, SIZE_LABELS};
use crate::store::Photo;
use crate::validation::{limits, validate_user_text};

/// One year, for immutable content-addressed images.
const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000";

#[derive(Debug, Deserialize)]
pub struct UpdatePhotoRequest {
    #[serde(default)]
    pub description: Option<String>,
}

async fn load_owned_photo(
    state: &AppState,
    session: &Session,
    uuid: &str,
    denied_message: &str,
) -> Result<Photo, ApiError> {
    let user = require_user(session, &state.store).await?;
    let photo = state
        .store
        .find_photo_by_uuid(uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound("Photo not found.".to_string()))?;
    if !user.can_access(photo.user_id) {
        return Err(ApiError::Forbidden(denied_message.to_string()));
    }
    Ok(photo)
}

pub async fn update_photo(
    State(state): State<AppState>,
    session: Session,
    AxumPath(uuid): AxumPath<String>,
    Json(request): Json<UpdatePhotoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = load_owned_photo(
        &state,
        &session,
        &uuid,
        "Forbidden: photo belongs to another user.",
    )
    .await?;

    let caption = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(caption) = caption {
        if let Some(message) = validate_user_text(caption, limits::CAPTION_EDIT, "Caption") {
            return Err(ApiError::field("description", message));
        }
    }

    let updated = state.store.update_photo_caption(photo.id, caption).await?;
    Ok(Json(PhotoResponse::from(updated)))
}

/// Delete the metadata row first, then remove the files best-effort. A
/// failed unlink leaves orphan bytes, never a dangling row.
pub async fn delete_photo(
    State(state): State<AppState>,
    session: Session,
    AxumPath(uuid): AxumPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = load_owned_photo(
        &state,
        &session,
        &uuid,
        "Forbidden: photo belongs to another user.",
    )
    .await?;

    let album = state.store.find_album_by_id(photo.album_id).await?;
    let owner = state.store.find_user_by_id(photo.user_id).await?;

    state.store.delete_photo(photo.id).await?;

    if let (Some(album), Some(owner)) = (album, owner) {
        let original = PathBuf::from(&photo.file_path);
        state
            .storage
            .delete_photo_files(&owner.uuid, &album.uuid, &original);
    }

    info!("Deleted photo {uuid}");
    Ok(StatusCode::NO_CONTENT)
}

/// Serve a photo at a named size. Requires login and ownership (or admin).
/// A missing derivative falls back to the stored original.
pub async fn serve_photo(
    State(state): State<AppState>,
    session: Session,
    AxumPath((uuid, size)): AxumPath<(String, String)>,
) -> Result<Response, ApiError> {
    let photo = load_owned_photo(
        &state,
        &session,
        &uuid,
        "You do not have permission to view this photo.",
    )
    .await?;

    if size != "original" && !SIZE_LABELS.contains(&size.as_str()) {
        return Err(ApiError::BadRequest("Unknown image size.".to_string()));
    }

    let original = PathBuf::from(&photo.file_path);
    if size == "original" {
        return serve_file(&original, &photo.mime).await;
    }

    let album = state
        .store
        .find_album_by_id(photo.album_id)
        .await?
        .ok_or_else(|| ApiError::internal("photo album missing"))?;
    let owner = state
        .store
        .find_user_by_id(photo.user_id)
        .await?
        .ok_or_else(|| ApiError::internal("photo owner missing"))?;

    let derivative = state
        .storage
        .derivative_path(&owner.uuid, &album.uuid, &size, &photo.uuid);
    if derivative.is_file() {
        let mime = format!("image/{DERIVATIVE_EXTENSION}");
        serve_file(&derivative, &mime).await
    } else {
        serve_file(&original, &photo.mime).await
    }
}

async fn serve_file(path: &Path, mime: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::NotFound("Photo not found.".to_string()))?;

    let stream = ReaderStream::new(file);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CACHE_CONTROL, CACHE_CONTROL_VALUE)
        .body(Body::from_stream(stream))
        .map_err(ApiError::internal)
}
