//! The upload pipeline: multipart parsing, the validation gate sequence,
//! album resolution, durable placement of the original, and derivative
//! generation.

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use image::ImageReader;
use serde::Serialize;
use std::io::Cursor;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::{AuthenticatedUser, current_user};
use crate::error::ApiError;
use crate::id;
use crate::photos::PhotoResponse;
use crate::storage::StorageLayout;
use crate::store::{Album, DEFAULT_ALBUM_NAME, NewPhoto};
use crate::validation::{limits, validate_user_text};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub album_uuid: String,
    pub photo: PhotoResponse,
}

#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Vec<u8>,
    album: Option<String>,
    description: Option<String>,
}

fn no_file_error() -> ApiError {
    ApiError::field(
        "photo",
        "No file was uploaded. Please choose an image and try again.",
    )
}

/// Drain the multipart stream into an [`UploadForm`]. Transport-level
/// failures mid-stream are reported the same way as a missing file.
async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|_| no_file_error())? {
        match field.name() {
            Some("photo") => {
                form.file_name = field.file_name().map(str::to_owned);
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|_| no_file_error())?
                    .to_vec();
            }
            Some("album") => {
                let value = field.text().await.map_err(|_| no_file_error())?;
                let value = value.trim().to_string();
                // Clients post the literal `default` to mean "my default
                // album"; it is a sentinel, not an identifier.
                if !value.is_empty() && value != DEFAULT_ALBUM_NAME {
                    form.album = Some(value);
                }
            }
            Some("description") => {
                let value = field.text().await.map_err(|_| no_file_error())?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    form.description = Some(value);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Resolve which album receives the upload.
///
/// Authenticated users upload to one of their own albums, or to their lazily
/// created default album when none is named. Anonymous uploads only ever land
/// in the shared anonymous default album; naming an album without being
/// logged in is rejected outright.
async fn resolve_album(
    state: &AppState,
    user: Option<&AuthenticatedUser>,
    album_uuid: Option<&str>,
) -> Result<Album, ApiError> {
    match (user, album_uuid) {
        (Some(user), Some(uuid)) => {
            let album = state
                .store
                .find_album_by_uuid(uuid)
                .await?
                .ok_or_else(|| ApiError::NotFound("Album not found.".to_string()))?;
            // Uploads go to the album owner's storage tree, so only the
            // owner may target an album explicitly. No admin bypass here.
            if album.user_id != user.id {
                return Err(ApiError::Forbidden(
                    "Forbidden: album belongs to another user.".to_string(),
                ));
            }
            Ok(album)
        }
        (Some(user), None) => Ok(state
            .store
            .get_or_create_default_album(user.id, None)
            .await?),
        (None, Some(_)) => Err(ApiError::Unauthorized(
            "Login required to upload to that album.".to_string(),
        )),
        (None, None) => {
            let anon = state.store.get_or_create_anonymous_user().await?;
            Ok(state
                .store
                .get_or_create_default_album(anon.id, Some("default"))
                .await?)
        }
    }
}

pub async fn upload_photo(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&session, &state.store).await?;
    let form = read_form(multipart).await?;

    // Gate 1: a file must actually be present.
    let file_name = form.file_name.filter(|n| !n.is_empty());
    let Some(file_name) = file_name else {
        return Err(no_file_error());
    };
    if form.bytes.is_empty() {
        return Err(no_file_error());
    }

    // Gate 2: caption length and character set.
    if let Some(description) = form.description.as_deref() {
        if let Some(message) = validate_user_text(description, limits::CAPTION_CREATE, "Caption") {
            return Err(ApiError::field("description", message));
        }
    }

    // Gate 3: content sniffing. The client-declared type and the file name
    // extension are both ignored.
    let mime = match image::guess_format(&form.bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => {
            return Err(ApiError::field("photo", "Uploaded file is not an image."));
        }
    };
    if !mime.starts_with("image/") {
        return Err(ApiError::field("photo", "Uploaded file is not an image."));
    }

    // Gate 4: byte-size cap.
    let max_bytes = state.config.uploads.max_bytes;
    if form.bytes.len() as u64 > max_bytes {
        return Err(ApiError::field(
            "photo",
            format!(
                "File too large. Maximum allowed size is {}MB.",
                max_bytes / 1_000_000
            ),
        ));
    }

    // Gate 5: the pixel data must decode far enough to yield dimensions.
    let (width, height) = ImageReader::new(Cursor::new(&form.bytes))
        .with_guessed_format()
        .map_err(|_| ApiError::field("photo", "Invalid image file."))?
        .into_dimensions()
        .map_err(|_| ApiError::field("photo", "Invalid image file."))?;

    let album = resolve_album(&state, user.as_ref(), form.album.as_deref()).await?;
    let owner = state
        .store
        .find_user_by_id(album.user_id)
        .await?
        .ok_or_else(|| ApiError::internal("album owner missing"))?;

    // Place the original under its content-addressed path, via a temp file in
    // the destination directory so the final name only ever appears complete.
    let photo_uuid = id::generate();
    let original_dir = state.storage.original_dir(&owner.uuid, &album.uuid);
    StorageLayout::ensure_dir(&original_dir).map_err(ApiError::internal)?;

    let final_path = state
        .storage
        .original_path(&owner.uuid, &album.uuid, &photo_uuid);
    let temp_path = original_dir.join(format!(".{photo_uuid}.part"));
    let size_bytes = form.bytes.len() as i64;
    tokio::fs::write(&temp_path, &form.bytes)
        .await
        .map_err(ApiError::internal)?;
    tokio::fs::rename(&temp_path, &final_path)
        .await
        .map_err(ApiError::internal)?;

    // Derivatives are best-effort: the serving layer falls back to the
    // original when one is missing.
    let generator = state.generator.clone();
    let source = final_path.clone();
    let dest_dir = state.storage.derivative_dir(&owner.uuid, &album.uuid);
    let sizes = state.config.uploads.size_spec();
    match tokio::task::spawn_blocking(move || generator.generate(&source, &dest_dir, &sizes)).await
    {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("derivative generation failed for {photo_uuid}: {e}"),
        Err(e) => warn!("derivative generation task panicked for {photo_uuid}: {e}"),
    }

    let file_path = final_path.to_string_lossy().into_owned();
    let photo = match state
        .store
        .insert_photo(NewPhoto {
            uuid: &photo_uuid,
            album_id: album.id,
            user_id: album.user_id,
            file_path: &file_path,
            original_name: &file_name,
            mime,
            size_bytes,
            width: width as i32,
            height: height as i32,
            description: form.description.as_deref(),
        })
        .await
    {
        Ok(photo) => photo,
        Err(e) => {
            // Metadata is the source of truth; stored bytes without a row are
            // unreachable, so clean them up before failing the request.
            warn!("photo metadata insert failed, removing stored files: {e:#}");
            state
                .storage
                .delete_photo_files(&owner.uuid, &album.uuid, &final_path);
            return Err(ApiError::Internal("Failed to save photo.".to_string()));
        }
    };

    info!(
        "Stored photo {} ({} bytes, {}x{}) in album {}",
        photo.uuid, photo.size_bytes, photo.width, photo.height, album.uuid
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            album_uuid: album.uuid,
            photo: PhotoResponse::from(photo),
        }),
    ))
}
