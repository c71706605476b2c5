use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod albums;
pub mod auth;
pub mod error;
pub mod id;
pub mod photos;
pub mod processing;
pub mod settings;
pub mod startup_checks;
pub mod storage;
pub mod store;
pub mod validation;

use processing::{DEFAULT_WEBP_QUALITY, DerivativeGenerator, SizeSpec};
use storage::StorageLayout;
use store::Store;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
    /// Whether session cookies carry the `Secure` attribute. Off by default
    /// so plain-HTTP development setups work.
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root under which `uploads/` and `cache/` trees are created.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub large_width: u32,
    pub medium_width: u32,
    pub thumb_width: u32,
    pub webp_quality: Option<f32>,
}

impl UploadConfig {
    pub fn size_spec(&self) -> SizeSpec {
        SizeSpec::new(vec![
            ("large".to_string(), self.large_width),
            ("medium".to_string(), self.medium_width),
            ("thumb".to_string(), self.thumb_width),
        ])
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            app: AppConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            uploads: UploadConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Shashinkan".to_string(),
            log_level: "info".to_string(),
            cookie_secure: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/shashinkan.db".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10_000_000,
            large_width: 1200,
            medium_width: 800,
            thumb_width: 320,
            webp_quality: Some(85.0),
        }
    }
}

use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub storage: StorageLayout,
    pub generator: Arc<DerivativeGenerator>,
    pub config: Config,
}

pub async fn create_app(config: Config) -> anyhow::Result<Router> {
    let store = Store::connect(&config.database.url).await?;
    Ok(create_app_with_store(config, store))
}

pub fn create_app_with_store(config: Config, store: Store) -> Router {
    let storage = StorageLayout::new(config.storage.root.clone());
    let generator = Arc::new(DerivativeGenerator::new(
        config.uploads.webp_quality.unwrap_or(DEFAULT_WEBP_QUALITY),
    ));

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.app.cookie_secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    // The size gate in the upload handler must see oversized bodies, so the
    // transport limit sits above the configured maximum.
    let body_limit = (config.uploads.max_bytes as usize) + 2 * 1024 * 1024;

    let app_state = AppState {
        store,
        storage,
        generator,
        config,
    };

    Router::new()
        .route("/api/auth/register", axum::routing::post(auth::register))
        .route("/api/auth/login", axum::routing::post(auth::login))
        .route("/api/auth/logout", axum::routing::post(auth::logout))
        .route("/api/auth/me", axum::routing::get(auth::me))
        .route(
            "/api/albums",
            axum::routing::get(albums::list_albums).post(albums::create_album),
        )
        .route("/api/albums/{uuid}", axum::routing::get(albums::get_album))
        .route("/api/photos", axum::routing::post(photos::upload_photo))
        .route(
            "/api/photos/{uuid}",
            axum::routing::patch(photos::update_photo).delete(photos::delete_photo),
        )
        .route(
            "/photos/{uuid}/{size}",
            axum::routing::get(photos::serve_photo),
        )
        .route(
            "/api/settings/profile",
            axum::routing::patch(settings::update_profile),
        )
        .route(
            "/api/settings/password",
            axum::routing::put(settings::change_password),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let method = request.method();
                    let uri = request.uri();
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");
                    let referer = headers
                        .get("referer")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %method,
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        referer = %referer,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %status,
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}
