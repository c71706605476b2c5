use crate::Config;
use crate::store::Store;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create storage directory: {0}")]
    StorageDirectoryCreationFailed(std::io::Error),

    #[error("Storage root is not writable: {0}")]
    StorageNotWritable(std::io::Error),

    #[error("Database is not reachable: {0}")]
    DatabaseUnreachable(String),
}

impl StartupCheckError {
    /// Checks that leave the server unable to accept uploads at all.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::StorageDirectoryCreationFailed(_) | Self::DatabaseUnreachable(_)
        )
    }
}

pub async fn perform_startup_checks(
    config: &Config,
    store: &Store,
) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    // Originals and derivatives trees must exist before the first upload.
    for subdir in ["uploads", "cache"] {
        let dir = config.storage.root.join(subdir);
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => info!("Storage directory ready: {:?}", dir),
            Err(e) => {
                error!("Failed to create storage directory {:?}: {}", dir, e);
                errors.push(StartupCheckError::StorageDirectoryCreationFailed(e));
            }
        }
    }

    // Write probe so a read-only mount is caught at boot rather than on the
    // first upload.
    let probe = config.storage.root.join(".write-probe");
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(&probe).await {
                warn!("Failed to remove write probe {:?}: {}", probe, e);
            }
            info!("Storage root is writable: {:?}", config.storage.root);
        }
        Err(e) => {
            error!("Storage root is not writable: {}", e);
            errors.push(StartupCheckError::StorageNotWritable(e));
        }
    }

    match store.ping().await {
        Ok(()) => info!("Database reachable: {}", config.database.url),
        Err(e) => {
            error!("Database is not reachable: {e:#}");
            errors.push(StartupCheckError::DatabaseUnreachable(format!("{e:#}")));
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
