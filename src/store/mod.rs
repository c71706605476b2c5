//! Metadata store: a sea-orm facade over sqlite, constructed once at the
//! process entry point and passed down explicitly.

pub mod entities;
pub mod migrator;

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, Statement,
};
use std::path::Path;
use std::time::Duration;
use tokio::task;
use tracing::info;

use entities::{albums, photos, users};

pub const ANONYMOUS_EMAIL: &str = "anon@local";
pub const DEFAULT_ALBUM_NAME: &str = "default";

/// User record without the password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub uuid: String,
    pub email: String,
    pub role: String,
    pub theme: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            uuid: model.uuid,
            email: model.email,
            role: model.role,
            theme: model.theme,
            first_name: model.first_name,
            last_name: model.last_name,
            bio: model.bio,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Album {
    pub id: i32,
    pub uuid: String,
    pub user_id: i32,
    pub name: String,
    pub created_at: String,
}

impl From<albums::Model> for Album {
    fn from(model: albums::Model) -> Self {
        Self {
            id: model.id,
            uuid: model.uuid,
            user_id: model.user_id,
            name: model.name,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Photo {
    pub id: i32,
    pub uuid: String,
    pub album_id: i32,
    pub user_id: i32,
    pub file_path: String,
    pub original_name: String,
    pub mime: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub description: Option<String>,
    pub uploaded_at: String,
}

impl From<photos::Model> for Photo {
    fn from(model: photos::Model) -> Self {
        Self {
            id: model.id,
            uuid: model.uuid,
            album_id: model.album_id,
            user_id: model.user_id,
            file_path: model.file_path,
            original_name: model.original_name,
            mime: model.mime,
            size_bytes: model.size_bytes,
            width: model.width,
            height: model.height,
            description: model.description,
            uploaded_at: model.uploaded_at,
        }
    }
}

/// Fields for a new photo row. The row is written only after the original
/// file is durably stored.
#[derive(Debug)]
pub struct NewPhoto<'a> {
    pub uuid: &'a str,
    pub album_id: i32,
    pub user_id: i32,
    pub file_path: &'a str,
    pub original_name: &'a str,
    pub mime: &'a str,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub description: Option<&'a str>,
}

#[derive(Clone)]
pub struct Store {
    conn: DatabaseConnection,
}

impl Store {
    pub async fn connect(db_url: &str) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        // In-memory sqlite is per-connection, so the pool must stay at one.
        opt.max_connections(if in_memory { 1 } else { 5 })
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        migrator::Migrator::up(&conn, None).await?;

        info!("Database connected & migrations applied");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    // === Users ===

    pub async fn create_user(&self, email: &str, password: &str, role: &str) -> Result<User> {
        let password_hash = hash_password_blocking(password.to_string()).await?;
        let model = users::ActiveModel {
            uuid: Set(crate::id::generate()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            role: Set(role.to_string()),
            theme: Set("light".to_string()),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        Ok(model.into())
    }

    pub async fn find_user_by_uuid(&self, uuid: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Uuid.eq(uuid))
            .one(&self.conn)
            .await
            .context("Failed to query user by uuid")?;
        Ok(user.map(User::from))
    }

    pub async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by id")?;
        Ok(user.map(User::from))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;
        Ok(user.map(User::from))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;
        Ok(users.into_iter().map(User::from).collect())
    }

    /// Verify a password for the given email, returning the user on success.
    /// Argon2 verification is CPU-heavy and runs on the blocking pool.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(model) = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?
        else {
            return Ok(None);
        };

        let password_hash = model.password_hash.clone();
        let password = password.to_string();
        let is_valid = task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
            Ok::<bool, anyhow::Error>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid.then(|| model.into()))
    }

    pub async fn update_password(&self, user_id: i32, new_password: &str) -> Result<()> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User {user_id} not found"))?;

        let new_hash = hash_password_blocking(new_password.to_string()).await?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        user_id: i32,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
    ) -> Result<()> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for profile update")?
            .ok_or_else(|| anyhow::anyhow!("User {user_id} not found"))?;

        let mut active: users::ActiveModel = user.into();
        active.first_name = Set(first_name.map(str::to_owned));
        active.last_name = Set(last_name.map(str::to_owned));
        active.bio = Set(bio.map(str::to_owned));
        active.update(&self.conn).await?;
        Ok(())
    }

    pub async fn update_theme(&self, user_id: i32, theme: &str) -> Result<()> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for theme update")?
            .ok_or_else(|| anyhow::anyhow!("User {user_id} not found"))?;

        let mut active: users::ActiveModel = user.into();
        active.theme = Set(theme.to_string());
        active.update(&self.conn).await?;
        Ok(())
    }

    /// The anonymous account receiving unauthenticated uploads. Created
    /// lazily with a throwaway password; a concurrent creation loses the
    /// insert race and re-reads.
    pub async fn get_or_create_anonymous_user(&self) -> Result<User> {
        if let Some(user) = self.find_user_by_email(ANONYMOUS_EMAIL).await? {
            return Ok(user);
        }
        match self.create_user(ANONYMOUS_EMAIL, &random_secret(), "user").await {
            Ok(user) => Ok(user),
            Err(_) => self
                .find_user_by_email(ANONYMOUS_EMAIL)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Failed to create anonymous user")),
        }
    }

    // === Albums ===

    pub async fn insert_album(&self, user_id: i32, name: &str) -> Result<Album> {
        self.insert_album_with_uuid(user_id, &crate::id::generate(), name)
            .await
    }

    async fn insert_album_with_uuid(&self, user_id: i32, uuid: &str, name: &str) -> Result<Album> {
        let model = albums::ActiveModel {
            uuid: Set(uuid.to_string()),
            user_id: Set(user_id),
            name: Set(name.to_string()),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert album")?;
        Ok(model.into())
    }

    pub async fn find_album_by_uuid(&self, uuid: &str) -> Result<Option<Album>> {
        let album = albums::Entity::find()
            .filter(albums::Column::Uuid.eq(uuid))
            .one(&self.conn)
            .await
            .context("Failed to query album by uuid")?;
        Ok(album.map(Album::from))
    }

    pub async fn find_album_by_id(&self, id: i32) -> Result<Option<Album>> {
        let album = albums::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query album by id")?;
        Ok(album.map(Album::from))
    }

    pub async fn albums_for_user(&self, user_id: i32) -> Result<Vec<Album>> {
        let albums = albums::Entity::find()
            .filter(albums::Column::UserId.eq(user_id))
            .order_by_desc(albums::Column::CreatedAt)
            .order_by_desc(albums::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list albums")?;
        Ok(albums.into_iter().map(Album::from).collect())
    }

    async fn find_default_album(&self, user_id: i32) -> Result<Option<Album>> {
        let album = albums::Entity::find()
            .filter(albums::Column::UserId.eq(user_id))
            .filter(albums::Column::Name.eq(DEFAULT_ALBUM_NAME))
            .one(&self.conn)
            .await
            .context("Failed to query default album")?;
        Ok(album.map(Album::from))
    }

    /// Idempotent get-or-create of a user's default album.
    ///
    /// Tolerates a uniqueness race: when the insert conflicts (a concurrent
    /// request created the album, or `preferred_uuid` is already taken
    /// globally) it re-queries, then retries exactly once with a freshly
    /// generated identifier.
    pub async fn get_or_create_default_album(
        &self,
        user_id: i32,
        preferred_uuid: Option<&str>,
    ) -> Result<Album> {
        if let Some(album) = self.find_default_album(user_id).await? {
            return Ok(album);
        }

        let uuid = preferred_uuid
            .map(str::to_owned)
            .unwrap_or_else(crate::id::generate);
        match self
            .insert_album_with_uuid(user_id, &uuid, DEFAULT_ALBUM_NAME)
            .await
        {
            Ok(album) => Ok(album),
            Err(_) => {
                if let Some(album) = self.find_default_album(user_id).await? {
                    return Ok(album);
                }
                self.insert_album_with_uuid(user_id, &crate::id::generate(), DEFAULT_ALBUM_NAME)
                    .await
            }
        }
    }

    // === Photos ===

    pub async fn insert_photo(&self, photo: NewPhoto<'_>) -> Result<Photo> {
        let model = photos::ActiveModel {
            uuid: Set(photo.uuid.to_string()),
            album_id: Set(photo.album_id),
            user_id: Set(photo.user_id),
            file_path: Set(photo.file_path.to_string()),
            original_name: Set(photo.original_name.to_string()),
            mime: Set(photo.mime.to_string()),
            size_bytes: Set(photo.size_bytes),
            width: Set(photo.width),
            height: Set(photo.height),
            description: Set(photo.description.map(str::to_owned)),
            uploaded_at: Set(now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert photo")?;
        Ok(model.into())
    }

    pub async fn find_photo_by_uuid(&self, uuid: &str) -> Result<Option<Photo>> {
        let photo = photos::Entity::find()
            .filter(photos::Column::Uuid.eq(uuid))
            .one(&self.conn)
            .await
            .context("Failed to query photo by uuid")?;
        Ok(photo.map(Photo::from))
    }

    /// Photos in an album, newest first.
    pub async fn photos_by_album(&self, album_id: i32) -> Result<Vec<Photo>> {
        let photos = photos::Entity::find()
            .filter(photos::Column::AlbumId.eq(album_id))
            .order_by_desc(photos::Column::UploadedAt)
            .order_by_desc(photos::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list photos")?;
        Ok(photos.into_iter().map(Photo::from).collect())
    }

    pub async fn update_photo_caption(
        &self,
        photo_id: i32,
        caption: Option<&str>,
    ) -> Result<Photo> {
        let photo = photos::Entity::find_by_id(photo_id)
            .one(&self.conn)
            .await
            .context("Failed to query photo for caption update")?
            .ok_or_else(|| anyhow::anyhow!("Photo {photo_id} not found"))?;

        let mut active: photos::ActiveModel = photo.into();
        active.description = Set(caption.map(str::to_owned));
        let updated = active.update(&self.conn).await?;
        Ok(updated.into())
    }

    pub async fn delete_photo(&self, photo_id: i32) -> Result<()> {
        photos::Entity::delete_by_id(photo_id)
            .exec(&self.conn)
            .await
            .context("Failed to delete photo")?;
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Hash a password with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

async fn hash_password_blocking(password: String) -> Result<String> {
    task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task panicked")?
}

/// Random 64-char hex secret, used as the anonymous account's password.
fn random_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
