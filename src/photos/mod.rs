//! Photo upload, metadata edits, deletion, and image serving.

mod handlers;
mod upload;

pub use handlers::{delete_photo, serve_photo, update_photo};
pub use upload::upload_photo;

use serde::Serialize;

use crate::store::Photo;

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub uuid: String,
    pub original_name: String,
    pub mime: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub description: Option<String>,
    pub uploaded_at: String,
}

impl From<Photo> for PhotoResponse {
    fn from(photo: Photo) -> Self {
        Self {
            uuid: photo.uuid,
            original_name: photo.original_name,
            mime: photo.mime,
            size_bytes: photo.size_bytes,
            width: photo.width,
            height: photo.height,
            description: photo.description,
            uploaded_at: photo.uploaded_at,
        }
    }
}
