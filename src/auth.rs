//! Session-cookie authentication: register, login, logout, and the helpers
//! handlers use to resolve the current user.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;
use crate::store::{Store, User};

const SESSION_USER_KEY: &str = "user";

pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// The logged-in user as seen by handlers, resolved from the session cookie
/// against the store on every request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub uuid: String,
    pub email: String,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Owner-or-admin check against a resource's owning user id.
    pub fn can_access(&self, owner_id: i32) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            uuid: user.uuid,
            email: user.email,
            role: user.role,
        }
    }
}

/// Resolve the session to a user, if any. A session pointing at a deleted
/// account resolves to `None` rather than an error.
pub async fn current_user(session: &Session, store: &Store) -> Result<Option<AuthenticatedUser>, ApiError> {
    let Some(uuid) = session
        .get::<String>(SESSION_USER_KEY)
        .await
        .map_err(ApiError::internal)?
    else {
        return Ok(None);
    };
    let user = store.find_user_by_uuid(&uuid).await?;
    Ok(user.map(AuthenticatedUser::from))
}

pub async fn require_user(session: &Session, store: &Store) -> Result<AuthenticatedUser, ApiError> {
    current_user(session, store)
        .await?
        .ok_or_else(ApiError::login_required)
}

async fn establish_session(session: &Session, user: &User) -> Result<(), ApiError> {
    // Rotate the session id on privilege change.
    session.cycle_id().await.map_err(ApiError::internal)?;
    session
        .insert(SESSION_USER_KEY, user.uuid.clone())
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub uuid: String,
    pub email: String,
    pub role: String,
    pub theme: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            email: user.email,
            role: user.role,
            theme: user.theme,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') || email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ApiError::field(
            "email",
            "Please enter a valid email address.",
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::field(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
        ));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&request.email, &request.password)?;
    let email = request.email.trim().to_lowercase();

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict(
            "An account with that email already exists.".to_string(),
        ));
    }

    let user = state.store.create_user(&email, &request.password, "user").await?;
    info!("Registered user {}", user.email);

    establish_session(&session, &user).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = request.email.trim().to_lowercase();
    let Some(user) = state.store.verify_password(&email, &request.password).await? else {
        debug!("Failed login attempt for {email}");
        return Err(ApiError::Unauthorized(
            "Invalid email or password.".to_string(),
        ));
    };

    establish_session(&session, &user).await?;
    info!("User {} logged in", user.email);
    Ok(Json(UserResponse::from(user)))
}

pub async fn logout(session: Session) -> Result<impl IntoResponse, ApiError> {
    session.flush().await.map_err(ApiError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&session, &state.store).await?;
    let full = state
        .store
        .find_user_by_uuid(&user.uuid)
        .await?
        .ok_or_else(ApiError::login_required)?;
    Ok(Json(UserResponse::from(full)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_validation() {
        assert!(validate_credentials("a@b.example", "longenough").is_ok());
        assert!(validate_credentials("not-an-email", "longenough").is_err());
        assert!(validate_credentials("", "longenough").is_err());
        assert!(validate_credentials("a@b.example", "short").is_err());

        let oversized = format!("{}@example.com", "x".repeat(260));
        assert!(validate_credentials(&oversized, "longenough").is_err());
    }

    #[test]
    fn owner_or_admin_access() {
        let owner = AuthenticatedUser {
            id: 1,
            uuid: "u1".into(),
            email: "o@example.com".into(),
            role: "user".into(),
        };
        let admin = AuthenticatedUser {
            id: 2,
            uuid: "u2".into(),
            email: "a@example.com".into(),
            role: "admin".into(),
        };
        let other = AuthenticatedUser {
            id: 3,
            uuid: "u3".into(),
            email: "x@example.com".into(),
            role: "user".into(),
        };
        assert!(owner.can_access(1));
        assert!(admin.can_access(1));
        assert!(!other.can_access(1));
    }
}
