//! Storing uploaded files in the library folder.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{FileRecord, Files, UploadNotices};
use crate::error::StoreError;
use crate::helpers::sanitize_file_name;
use crate::taxonomy::FORMATS;

/// Why an upload was not stored.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Another entry already owns a file with this name.
    #[error("another file already exists with the same file name \"{name}\" (file {owner_id})")]
    Duplicate { name: String, owner_id: i64 },

    /// The file to upload does not exist.
    #[error("upload source not found: {0}")]
    MissingSource(PathBuf),

    /// Copying into the upload folder failed.
    #[error("could not store {path}: {message}")]
    Storage { path: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Files {
    /// Returns the entry that already owns `file_name`, unless the first
    /// owner is `current_id` itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the lookup fails.
    pub async fn link_exists(&self, current_id: i64, file_name: &str) -> Result<Option<FileRecord>, StoreError> {
        let owner = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM files WHERE file_name = ? ORDER BY id LIMIT 1",
            super::FILE_COLUMNS
        ))
        .bind(file_name)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(owner.filter(|file| file.id != current_id))
    }

    /// Stores `source` as the file of entry `id`.
    ///
    /// The name is sanitized (`report final.pdf` becomes `report_final.pdf`).
    /// A name owned by another entry is rejected and remembered on this entry;
    /// otherwise the previous file is removed, the new one copied into the
    /// upload folder and its extension attached as a format term. A failed
    /// copy is remembered as well. Both notices are read back once through
    /// [`Files::take_upload_errors`].
    ///
    /// # Errors
    ///
    /// See [`UploadError`].
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub async fn save_upload(&self, id: i64, source: &Path, original_name: &str) -> Result<FileRecord, UploadError> {
        let file = self.require(id).await?;
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(UploadError::MissingSource(source.to_path_buf()));
        }

        let name = sanitize_file_name(original_name);
        if name.is_empty() {
            return Err(StoreError::invalid("file name", original_name, "nothing left after sanitizing").into());
        }

        if let Some(owner) = self.link_exists(id, &name).await? {
            warn!(name = %name, owner = owner.id, "upload rejected, file name taken");
            self.set_upload_notice("upload_error", id, &name).await?;
            return Err(UploadError::Duplicate {
                name,
                owner_id: owner.id,
            });
        }

        let folder = self.folder_path().await?;
        if let Some(old) = file.file_name.as_deref() {
            let old_path = folder.join(old);
            if tokio::fs::try_exists(&old_path).await.unwrap_or(false)
                && let Err(err) = tokio::fs::remove_file(&old_path).await
            {
                warn!(path = %old_path.display(), error = %err, "could not remove previous file");
            }
        }

        let target = folder.join(&name);
        let stored = match tokio::fs::create_dir_all(&folder).await {
            Ok(()) => tokio::fs::copy(source, &target).await.map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = stored {
            let message = format!("There was an error uploading your file: {err}");
            self.set_upload_notice("upload_error_msg", id, &message).await?;
            return Err(UploadError::Storage {
                path: target.display().to_string(),
                message: err.to_string(),
            });
        }

        sqlx::query(
            "UPDATE files SET file_name = ?, upload_error = NULL, upload_error_msg = NULL,
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(&name)
        .bind(id)
        .execute(self.db.pool())
        .await
        .map_err(StoreError::from)?;

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !extension.is_empty() {
            self.taxonomies
                .set_file_terms(id, FORMATS, &[extension])
                .await?;
        }

        self.flush_lists();
        info!(id, name = %name, "file stored");
        Ok(self.require(id).await?)
    }

    /// Returns and clears the transient upload notices of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    pub async fn take_upload_errors(&self, id: i64) -> Result<UploadNotices, StoreError> {
        let file = self.require(id).await?;
        let notices = UploadNotices {
            duplicate_of: file.upload_error,
            storage_error: file.upload_error_msg,
        };
        if !notices.is_empty() {
            sqlx::query("UPDATE files SET upload_error = NULL, upload_error_msg = NULL WHERE id = ?")
                .bind(id)
                .execute(self.db.pool())
                .await?;
            self.flush_lists();
        }
        Ok(notices)
    }

    async fn set_upload_notice(&self, column: &'static str, id: i64, value: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("UPDATE files SET {column} = ? WHERE id = ?"))
            .bind(value)
            .bind(id)
            .execute(self.db.pool())
            .await?;
        self.flush_lists();
        Ok(())
    }
}
