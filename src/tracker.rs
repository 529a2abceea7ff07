//! Recording a download.
//!
//! Only published files the requester may access are served. The counter on
//! the file entry is then always bumped. The log row is only written while
//! tracking is enabled, and a failed insert is logged and swallowed so the
//! visitor still gets the file.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::downloads::DownloadLogRepository;
use crate::error::StoreError;
use crate::files::{FileRecord, Files};
use crate::users::Requester;

/// Why a download could not be recorded.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("No file ID found.")]
    MissingFileId,

    #[error("File ID {0} does not exist.")]
    UnknownFile(i64),

    #[error("File ID {0} is not published.")]
    NotPublished(i64),

    #[error("You do not have permission to access this file.")]
    NoAccess(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a recorded download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// The entry after its counter was bumped.
    pub file: FileRecord,
    /// Where to send the visitor, after hooks; `None` when no file is stored.
    pub url: Option<String>,
    /// Whether a log row was written.
    pub logged: bool,
}

/// Counts downloads and appends them to the log.
#[derive(Clone)]
pub struct DownloadTracker {
    files: Files,
    log: Arc<dyn DownloadLogRepository>,
}

impl std::fmt::Debug for DownloadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTracker")
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl DownloadTracker {
    #[must_use]
    pub fn new(files: Files, log: Arc<dyn DownloadLogRepository>) -> Self {
        Self { files, log }
    }

    /// Counts one download of `file_id` by `requester` and returns the URL to
    /// hand out.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingFileId`] for id 0,
    /// [`DownloadError::UnknownFile`] for ids without an entry,
    /// [`DownloadError::NotPublished`] for drafts, [`DownloadError::NoAccess`]
    /// when the requester fails the file's requirements and
    /// [`DownloadError::Store`] when the counter cannot be updated.
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn record_download(&self, file_id: i64, requester: &Requester) -> Result<DownloadOutcome, DownloadError> {
        if file_id <= 0 {
            return Err(DownloadError::MissingFileId);
        }
        match self.files.get(file_id).await? {
            None => return Err(DownloadError::UnknownFile(file_id)),
            Some(file) if !file.is_published() => return Err(DownloadError::NotPublished(file_id)),
            Some(_) => {}
        }
        if !self
            .files
            .user_meets_requirements(file_id, requester.user_id)
            .await?
        {
            warn!(file_id, "download refused");
            return Err(DownloadError::NoAccess(file_id));
        }

        let file = match self.files.increment_download_count(file_id, requester.user_id).await {
            Ok(file) => file,
            Err(StoreError::FileNotFound(id)) => return Err(DownloadError::UnknownFile(id)),
            Err(err) => return Err(err.into()),
        };

        let guest_ip = if requester.is_logged_in() {
            None
        } else {
            requester.ip.as_deref()
        };

        let mut logged = false;
        if self.files.settings().is_tracking().await? {
            match self.log.add_record(requester.user_id, guest_ip, file_id).await {
                Ok(_) => logged = true,
                Err(err) => warn!(file_id, error = %err, "failed to track download"),
            }
        }

        let hooks = self.files.hooks();
        let url = self
            .files
            .url_for(&file)
            .await?
            .map(|url| hooks.download_url(url, &file, requester));
        hooks.file_downloaded(&file, url.as_deref().unwrap_or_default(), requester);

        info!(file_id, count = file.download_count, logged, "download recorded");
        Ok(DownloadOutcome { file, url, logged })
    }
}
