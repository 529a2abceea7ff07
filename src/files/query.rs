//! File listing query types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::FileRecord;
use crate::helpers::sanitize_key;

/// Default page size of file lists.
pub const DEFAULT_LIST_PER_PAGE: u32 = 10;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Case-insensitive; anything but `desc` sorts ascending.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column a file list is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrderBy {
    #[default]
    Title,
    Date,
    Modified,
    Id,
    DownloadCount,
}

impl FileOrderBy {
    /// Column name, safe to splice into SQL.
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Date => "created_at",
            Self::Modified => "updated_at",
            Self::Id => "id",
            Self::DownloadCount => "download_count",
        }
    }

    /// Accepts the usual list aliases (`post_title`, `ID`, `downloads`);
    /// unknown values sort by title.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match sanitize_key(value).as_str() {
            "date" | "post_date" => Self::Date,
            "modified" | "post_modified" => Self::Modified,
            "id" => Self::Id,
            "download_count" | "downloads" | "count" => Self::DownloadCount,
            _ => Self::Title,
        }
    }
}

/// Filters for [`Files::get_files`](super::Files::get_files).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListQuery {
    /// Explicit ids; when set every other filter is ignored.
    pub file_ids: Vec<i64>,
    pub resource_types: Vec<String>,
    pub target_audiences: Vec<String>,
    pub formats: Vec<String>,
    /// Each role must appear in the file's required roles.
    pub required_roles: Vec<String>,
    /// Each key must appear in the file's required meta key.
    pub required_meta_keys: Vec<String>,
    pub order: SortOrder,
    pub order_by: FileOrderBy,
    pub per_page: u32,
    pub offset: u32,
}

impl Default for FileListQuery {
    fn default() -> Self {
        Self {
            file_ids: Vec::new(),
            resource_types: Vec::new(),
            target_audiences: Vec::new(),
            formats: Vec::new(),
            required_roles: Vec::new(),
            required_meta_keys: Vec::new(),
            order: SortOrder::Asc,
            order_by: FileOrderBy::Title,
            per_page: DEFAULT_LIST_PER_PAGE,
            offset: 0,
        }
    }
}

/// One page of files plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<FileRecord>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parsing() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Asc);
        assert_eq!(FileOrderBy::parse("post_title"), FileOrderBy::Title);
        assert_eq!(FileOrderBy::parse("ID"), FileOrderBy::Id);
        assert_eq!(FileOrderBy::parse("date"), FileOrderBy::Date);
        assert_eq!(FileOrderBy::parse("1; drop"), FileOrderBy::Title);
    }
}
