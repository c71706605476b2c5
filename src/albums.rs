//! Album listing, creation, and detail views.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;

use crate::AppState;
use crate::auth::require_user;
use crate::error::ApiError;
use crate::photos::PhotoResponse;
use crate::store::Album;
use crate::validation::{limits, validate_user_text};

#[derive(Debug, Serialize)]
pub struct AlbumResponse {
    pub uuid: String,
    pub name: String,
    pub created_at: String,
}

impl From<Album> for AlbumResponse {
    fn from(album: Album) -> Self {
        Self {
            uuid: album.uuid,
            name: album.name,
            created_at: album.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlbumDetailResponse {
    pub uuid: String,
    pub name: String,
    pub created_at: String,
    pub photos: Vec<PhotoResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: String,
}

/// The caller's own albums, newest first.
pub async fn list_albums(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;
    let albums = state.store.albums_for_user(user.id).await?;
    Ok(Json(
        albums
            .into_iter()
            .map(AlbumResponse::from)
            .collect::<Vec<_>>(),
    ))
}

pub async fn create_album(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateAlbumRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::field("name", "Album name is required."));
    }
    if let Some(message) = validate_user_text(name, limits::ALBUM_NAME, "Album name") {
        return Err(ApiError::field("name", message));
    }

    let album = state.store.insert_album(user.id, name).await?;
    info!("User {} created album {}", user.email, album.uuid);
    Ok((StatusCode::CREATED, Json(AlbumResponse::from(album))))
}

/// Album detail with its photos, newest first. Owner or admin only.
pub async fn get_album(
    State(state): State<AppState>,
    session: Session,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;

    let album = state
        .store
        .find_album_by_uuid(&uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound("Album not found.".to_string()))?;
    if !user.can_access(album.user_id) {
        return Err(ApiError::Forbidden(
            "Forbidden: album belongs to another user.".to_string(),
        ));
    }

    let photos = state.store.photos_by_album(album.id).await?;
    Ok(Json(AlbumDetailResponse {
        uuid: album.uuid,
        name: album.name,
        created_at: album.created_at,
        photos: photos.into_iter().map(PhotoResponse::from).collect(),
    }))
}
