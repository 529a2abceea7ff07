//! File entry types.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::helpers::sanitize_key;

/// Publication status of a file entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    #[default]
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

impl FileStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Self::Publish),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "private" => Ok(Self::Private),
            "trash" => Ok(Self::Trash),
            _ => Err(format!("invalid file status: {s}")),
        }
    }
}

/// A downloadable file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub title: String,
    /// Stored as text, parsed via `status()`.
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: String,
    pub author_id: i64,
    /// Name of the stored file inside the upload folder.
    pub file_name: Option<String>,
    pub description: String,
    /// Denormalized download counter, kept even when tracking is off.
    pub download_count: i64,
    /// Comma-separated role slugs; empty means no role requirement.
    pub required_roles: String,
    /// User meta key that must be truthy; empty means no requirement.
    pub required_meta_key: String,
    pub last_downloaded: Option<String>,
    pub last_downloaded_by: Option<i64>,
    pub featured_image: Option<String>,
    /// Filename that another entry already owns, set by a rejected upload.
    pub upload_error: Option<String>,
    /// Storage failure text from the last upload.
    pub upload_error_msg: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Draft` if the stored value is unknown.
    #[must_use]
    pub fn status(&self) -> FileStatus {
        self.status_str.parse().unwrap_or(FileStatus::Draft)
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status() == FileStatus::Publish
    }

    /// Required role slugs.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        split_roles(&self.required_roles)
    }

    /// Whether any role or meta requirement is set.
    #[must_use]
    pub fn has_requirements(&self) -> bool {
        !self.roles().is_empty() || !self.required_meta_key.trim().is_empty()
    }

    /// Lowercase extension of the stored file, empty when there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// `YYYY-MM-DD` part of the creation timestamp.
    #[must_use]
    pub fn created_date(&self) -> &str {
        self.created_at.get(..10).unwrap_or(&self.created_at)
    }
}

pub(crate) fn split_roles(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Joins role slugs the way they are stored: sanitized, comma-separated.
pub(crate) fn join_roles(roles: &[String]) -> String {
    roles
        .iter()
        .map(|role| sanitize_key(role))
        .filter(|role| !role.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Input for [`Files::create`](super::Files::create).
#[derive(Debug, Clone, Default)]
pub struct NewFile<'a> {
    pub title: &'a str,
    pub status: FileStatus,
    pub author_id: i64,
    pub description: &'a str,
    pub required_roles: &'a [String],
    pub required_meta_key: &'a str,
}

/// Partial update for [`Files::update_details`](super::Files::update_details).
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub title: Option<String>,
    pub status: Option<FileStatus>,
    pub description: Option<String>,
    pub download_count: Option<i64>,
    pub required_roles: Option<Vec<String>>,
    pub required_meta_key: Option<String>,
    pub featured_image: Option<String>,
}

/// Transient upload problems, returned once by
/// [`Files::take_upload_errors`](super::Files::take_upload_errors).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadNotices {
    /// Filename already owned by another entry.
    pub duplicate_of: Option<String>,
    /// Storage failure text.
    pub storage_error: Option<String>,
}

impl UploadNotices {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.duplicate_of.is_none() && self.storage_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_round_trip_through_storage_format() {
        let stored = join_roles(&["Editor".to_string(), " ".to_string(), "member".to_string()]);
        assert_eq!(stored, "editor,member");
        let file = FileRecord {
            required_roles: stored,
            ..FileRecord::default()
        };
        assert_eq!(file.roles(), vec!["editor", "member"]);
        assert!(file.has_requirements());
    }

    #[test]
    fn test_no_requirements() {
        let file = FileRecord {
            required_meta_key: "  ".to_string(),
            ..FileRecord::default()
        };
        assert!(!file.has_requirements());
    }

    #[test]
    fn test_extension_and_status() {
        let file = FileRecord {
            file_name: Some("Report_Final.PDF".to_string()),
            status_str: "trash".to_string(),
            created_at: "2024-10-15 08:00:00".to_string(),
            ..FileRecord::default()
        };
        assert_eq!(file.extension(), "pdf");
        assert_eq!(file.status(), FileStatus::Trash);
        assert!(!file.is_published());
        assert_eq!(file.created_date(), "2024-10-15");
        assert_eq!(FileRecord::default().extension(), "");
    }
}
