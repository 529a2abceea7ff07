//! Download log row and query types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Timestamp layout of the `time` column.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One logged download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DownloadRecord {
    pub id: i64,
    /// 0 for guests.
    pub user_id: i64,
    /// Only set for guests.
    pub user_ip: Option<String>,
    pub file_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub time: String,
}

/// Column the log query sorts by, always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOrder {
    Id,
    Time,
    UserId,
    FileId,
}

impl DownloadOrder {
    /// Column name, safe to splice into SQL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Time => "time",
            Self::UserId => "user_id",
            Self::FileId => "file_id",
        }
    }
}

impl fmt::Display for DownloadOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DownloadOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "time" => Ok(Self::Time),
            "user_id" => Ok(Self::UserId),
            "file_id" => Ok(Self::FileId),
            _ => Err(format!("invalid download order column: {s}")),
        }
    }
}

/// Filters for [`DownloadLog::get`](super::DownloadLog::get). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadQuery {
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
    pub file_id: Option<i64>,
    /// `taxonomy => term slug`; a row matches when its file carries any pair.
    pub taxonomies: BTreeMap<String, String>,
    /// Inclusive, from midnight.
    pub start_date: Option<NaiveDate>,
    /// Inclusive, until 23:59:59.
    pub end_date: Option<NaiveDate>,
    pub order_by: Option<DownloadOrder>,
}

impl DownloadQuery {
    pub(crate) fn start_bound(&self) -> Option<String> {
        day_start(self.start_date)
    }

    pub(crate) fn end_bound(&self) -> Option<String> {
        day_end(self.end_date)
    }
}

pub(crate) fn day_start(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")))
}

pub(crate) fn day_end(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| format!("{} 23:59:59", d.format("%Y-%m-%d")))
}

/// Download total for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileDownloads {
    pub file_id: i64,
    pub title: String,
    pub downloads: i64,
}

/// Logged download count for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileCount {
    pub file_id: i64,
    pub count: i64,
}

/// Download total for one registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserDownloads {
    pub user_id: i64,
    pub display_name: String,
    pub downloads: i64,
}

/// Download total for one taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TermDownloads {
    pub term_id: i64,
    pub term_name: String,
    pub downloads: i64,
}

/// Most recent download of a file by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub file_id: i64,
    pub last_download_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_bounds_cover_whole_days() {
        let query = DownloadQuery {
            start_date: NaiveDate::from_ymd_opt(2024, 10, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 10, 31),
            ..DownloadQuery::default()
        };
        assert_eq!(query.start_bound().as_deref(), Some("2024-10-01 00:00:00"));
        assert_eq!(query.end_bound().as_deref(), Some("2024-10-31 23:59:59"));
        assert_eq!(DownloadQuery::default().start_bound(), None);
    }

    #[test]
    fn test_order_parse_rejects_arbitrary_sql() {
        assert_eq!("time".parse::<DownloadOrder>(), Ok(DownloadOrder::Time));
        assert!("time; DROP TABLE files".parse::<DownloadOrder>().is_err());
    }
}
