//! Account settings: profile fields, theme, and password change.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::AppState;
use crate::auth::{MIN_PASSWORD_LENGTH, require_user};
use crate::error::ApiError;
use crate::validation::{limits, validate_user_text};

const THEMES: &[&str] = &["light", "dark"];

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Trim an optional field, treating an empty result as cleared.
fn normalize(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;

    let first_name = normalize(request.first_name.as_ref());
    let last_name = normalize(request.last_name.as_ref());
    let bio = normalize(request.bio.as_ref());

    if let Some(value) = first_name {
        if let Some(message) = validate_user_text(value, limits::NAME, "First name") {
            return Err(ApiError::field("first_name", message));
        }
    }
    if let Some(value) = last_name {
        if let Some(message) = validate_user_text(value, limits::NAME, "Last name") {
            return Err(ApiError::field("last_name", message));
        }
    }
    if let Some(value) = bio {
        if let Some(message) = validate_user_text(value, limits::BIO, "Bio") {
            return Err(ApiError::field("bio", message));
        }
    }

    state
        .store
        .update_profile(user.id, first_name, last_name, bio)
        .await?;

    if let Some(theme) = request.theme.as_deref() {
        if !THEMES.contains(&theme) {
            return Err(ApiError::field("theme", "Unknown theme.".to_string()));
        }
        state.store.update_theme(user.id, theme).await?;
    }

    info!("User {} updated profile", user.email);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<PasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;

    if state
        .store
        .verify_password(&user.email, &request.current_password)
        .await?
        .is_none()
    {
        return Err(ApiError::field(
            "current_password",
            "Current password is incorrect.",
        ));
    }
    if request.new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::field(
            "new_password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
        ));
    }

    state.store.update_password(user.id, &request.new_password).await?;
    info!("User {} changed password", user.email);
    Ok(StatusCode::NO_CONTENT)
}
