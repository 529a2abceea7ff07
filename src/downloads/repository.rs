//! Repository seam for download log writes.
//!
//! The download tracker and file deletion depend on this trait instead of the
//! concrete [`DownloadLog`], so a failing or in-memory log can be swapped in.

use async_trait::async_trait;

use super::{DownloadLog, Result};

/// Write-side contract of the download log.
#[async_trait]
pub trait DownloadLogRepository: Send + Sync {
    /// Appends one download row and returns its id.
    async fn add_record(&self, user_id: i64, user_ip: Option<&str>, file_id: i64) -> Result<i64>;

    /// Removes all rows for a file.
    async fn delete_file_records(&self, file_id: i64) -> Result<u64>;

    /// Removes all rows for a user.
    async fn delete_user_records(&self, user_id: i64) -> Result<u64>;
}

#[async_trait]
impl DownloadLogRepository for DownloadLog {
    async fn add_record(&self, user_id: i64, user_ip: Option<&str>, file_id: i64) -> Result<i64> {
        DownloadLog::add_record(self, user_id, user_ip, file_id).await
    }

    async fn delete_file_records(&self, file_id: i64) -> Result<u64> {
        DownloadLog::delete_file_records(self, file_id).await
    }

    async fn delete_user_records(&self, user_id: i64) -> Result<u64> {
        DownloadLog::delete_user_records(self, user_id).await
    }
}
