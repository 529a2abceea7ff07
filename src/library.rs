//! Service wiring and install lifecycle.
//!
//! [`FileLibrary`] opens the database from a [`LibraryConfig`] and hands out
//! the stores and front ends that share it: one pool, one cache, one hook
//! list.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};

use crate::ajax::{Ajax, Nonces};
use crate::cache::CacheStore;
use crate::config::{ConfigError, LibraryConfig};
use crate::db::{Database, DbError};
use crate::downloads::DownloadLog;
use crate::error::StoreError;
use crate::files::Files;
use crate::hooks::Hooks;
use crate::listing::DownloadLogView;
use crate::report::Report;
use crate::settings::{Settings, keys};
use crate::shortcodes::Shortcodes;
use crate::taxonomy::Taxonomies;
use crate::tracker::DownloadTracker;
use crate::users::Users;

/// Errors raised while opening or tearing down the library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every service of one library installation.
#[derive(Debug, Clone)]
pub struct FileLibrary {
    config: LibraryConfig,
    db: Database,
    cache: Arc<CacheStore>,
    log: DownloadLog,
    files: Files,
    tracker: DownloadTracker,
    nonces: Nonces,
}

impl FileLibrary {
    /// Opens the library without hooks.
    ///
    /// # Errors
    ///
    /// See [`FileLibrary::open_with_hooks`].
    pub async fn open(config: LibraryConfig) -> Result<Self, LibraryError> {
        Self::open_with_hooks(config, Hooks::new()).await
    }

    /// Validates `config`, opens (and migrates) the database and creates the
    /// download log table when tracking is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Config`] for invalid settings,
    /// [`LibraryError::Database`] when the database cannot be opened and
    /// [`LibraryError::Store`] when the log table cannot be created.
    #[instrument(skip(config, hooks), fields(db = %config.database_path.display()))]
    pub async fn open_with_hooks(config: LibraryConfig, hooks: Hooks) -> Result<Self, LibraryError> {
        config.validate()?;
        let db = Database::with_options(
            &config.database_path,
            config.db_max_connections,
            config.db_busy_timeout_ms,
        )
        .await?;
        Self::assemble(config, db, hooks).await
    }

    async fn assemble(config: LibraryConfig, db: Database, hooks: Hooks) -> Result<Self, LibraryError> {
        let cache = Arc::new(CacheStore::new(Duration::from_secs(config.cache_ttl_secs)));
        let log = DownloadLog::new(db.clone(), cache.clone(), &config.table_prefix);
        let files = Files::new(
            db.clone(),
            cache.clone(),
            Arc::new(log.clone()),
            Arc::new(hooks),
            config.uploads_dir.clone(),
            config.base_url.clone(),
        );
        let tracker = DownloadTracker::new(files.clone(), Arc::new(log.clone()));
        let nonces = Nonces::new(config.nonce_secret.clone());

        let library = Self {
            config,
            db,
            cache,
            log,
            files,
            tracker,
            nonces,
        };
        if library.settings().is_tracking().await? {
            library.log.ensure_table().await?;
        }
        info!(table = library.log.table(), "file library ready");
        Ok(library)
    }

    #[must_use]
    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.files.settings()
    }

    #[must_use]
    pub fn users(&self) -> &Users {
        self.files.users()
    }

    #[must_use]
    pub fn taxonomies(&self) -> &Taxonomies {
        self.files.taxonomies()
    }

    #[must_use]
    pub fn downloads(&self) -> &DownloadLog {
        &self.log
    }

    #[must_use]
    pub fn files(&self) -> &Files {
        &self.files
    }

    #[must_use]
    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    #[must_use]
    pub fn nonces(&self) -> &Nonces {
        &self.nonces
    }

    #[must_use]
    pub fn ajax(&self) -> Ajax {
        Ajax::new(self.files.clone(), self.tracker.clone(), self.nonces.clone())
    }

    #[must_use]
    pub fn shortcodes(&self) -> Shortcodes {
        Shortcodes::new(
            self.files.clone(),
            self.log.clone(),
            self.config.assets_url.clone(),
        )
    }

    #[must_use]
    pub fn report(&self) -> Report {
        Report::new(self.log.clone(), self.files.clone())
    }

    #[must_use]
    pub fn download_log_view(&self) -> DownloadLogView {
        DownloadLogView::new(self.log.clone(), self.files.clone())
    }

    /// Turns tracking on or off; turning it on creates the log table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the option or table cannot be written.
    pub async fn set_tracking(&self, enabled: bool) -> Result<(), StoreError> {
        self.settings()
            .set(keys::TRACKING, if enabled { "1" } else { "0" })
            .await?;
        if enabled {
            self.log.ensure_table().await?;
        }
        Ok(())
    }

    /// Removes a user together with their download history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UserNotFound`] for unknown ids.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i64) -> Result<u64, StoreError> {
        if self.users().get(user_id).await?.is_none() {
            return Err(StoreError::UserNotFound(user_id));
        }
        let removed = self.log.delete_user_records(user_id).await?;
        self.users().delete(user_id).await?;
        info!(user_id, removed, "user deleted");
        Ok(removed)
    }

    /// Plugin removal: drops the log table when `erifl_delete_table` is set
    /// and forgets the stored page size. Returns whether the table was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    #[instrument(skip(self))]
    pub async fn uninstall(&self) -> Result<bool, StoreError> {
        let settings = self.settings().load().await?;
        if settings.delete_table {
            self.log.drop_table().await?;
        }
        self.settings().delete(keys::PER_PAGE).await?;
        info!(dropped = settings.delete_table, "uninstalled");
        Ok(settings.delete_table)
    }

    /// Closes the connection pool.
    pub async fn close(self) {
        self.db.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::downloads::DownloadQuery;
    use crate::files::NewFile;
    use crate::users::{NewUser, Requester};

    fn config(tmp: &TempDir) -> LibraryConfig {
        LibraryConfig {
            database_path: tmp.path().join("library.db"),
            uploads_dir: tmp.path().join("uploads"),
            table_prefix: "wp_".to_string(),
            ..LibraryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_log_table_only_when_tracking() {
        let tmp = TempDir::new().unwrap();
        let library = FileLibrary::open(config(&tmp)).await.unwrap();
        assert!(!library.downloads().table_exists().await.unwrap());

        library.set_tracking(true).await.unwrap();
        assert!(library.downloads().table_exists().await.unwrap());
        assert_eq!(library.downloads().table(), "wp_eri_file_library");
        library.close().await;

        let reopened = FileLibrary::open(config(&tmp)).await.unwrap();
        assert!(reopened.settings().is_tracking().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_removes_history() {
        let tmp = TempDir::new().unwrap();
        let library = FileLibrary::open(config(&tmp)).await.unwrap();
        library.set_tracking(true).await.unwrap();

        let user = library
            .users()
            .create(&NewUser {
                login: "reader",
                email: "reader@example.com",
                display_name: "Reader",
                roles: &[],
            })
            .await
            .unwrap();
        let file = library
            .files()
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();
        let requester = library.users().requester(user, None).await.unwrap();
        library.tracker().record_download(file.id, &requester).await.unwrap();
        library
            .tracker()
            .record_download(file.id, &Requester::guest(Some("203.0.113.5".to_string())))
            .await
            .unwrap();

        assert_eq!(library.delete_user(user).await.unwrap(), 1);
        let rows = library.downloads().get(&DownloadQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, 0);
        assert!(library.users().get(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_user_keeps_history() {
        let tmp = TempDir::new().unwrap();
        let library = FileLibrary::open(config(&tmp)).await.unwrap();
        library.set_tracking(true).await.unwrap();
        let file = library
            .files()
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();
        // Rows for an id with no user record.
        library.downloads().add_record(42, None, file.id).await.unwrap();

        let err = library.delete_user(42).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(42)));
        assert_eq!(library.downloads().get(&DownloadQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_respects_delete_table() {
        let tmp = TempDir::new().unwrap();
        let library = FileLibrary::open(config(&tmp)).await.unwrap();
        library.set_tracking(true).await.unwrap();
        library.settings().set_per_page(10).await.unwrap();

        assert!(!library.uninstall().await.unwrap());
        assert!(library.downloads().table_exists().await.unwrap());
        assert_eq!(library.settings().get(keys::PER_PAGE).await.unwrap(), None);

        library.settings().set(keys::DELETE_TABLE, "1").await.unwrap();
        assert!(library.uninstall().await.unwrap());
        assert!(!library.downloads().table_exists().await.unwrap());
    }
}
