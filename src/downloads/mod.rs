//! Download log store.
//!
//! Every tracked download appends one row to `{prefix}eri_file_library`.
//! The table only exists while tracking is enabled, so it is created at
//! runtime by [`DownloadLog::ensure_table`] rather than by the migrations;
//! reads against a missing table return empty results.
//!
//! Reads are cached in the [`DOWNLOADS_GROUP`] cache group for the configured
//! TTL. Every write flushes the whole group, trading hit rate for never
//! serving an aggregate that disagrees with the table.
//!
//! Rows are never cascaded by the database: file and user deletion call
//! [`DownloadLog::delete_file_records`] / [`DownloadLog::delete_user_records`],
//! and aggregate queries join against published files so orphans drop out.

mod record;
mod repository;

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, instrument};

pub use record::{
    DownloadOrder, DownloadQuery, DownloadRecord, FileCount, FileDownloads, HistoryEntry,
    TIME_FORMAT, TermDownloads, UserDownloads,
};
pub use repository::DownloadLogRepository;

use crate::cache::{CacheStore, DOWNLOADS_GROUP, cache_key};
use crate::db::Database;
use crate::error::Result;
use crate::taxonomy::Taxonomies;
use crate::users::GUEST_USER_ID;
use record::{day_end, day_start};

/// Default row count for "top" reports.
pub const DEFAULT_TOP_QTY: u32 = 10;

/// Largest row count accepted for "top" reports.
pub const MAX_TOP_QTY: u32 = 1000;

fn normalize_qty(qty: u32) -> i64 {
    i64::from(if qty == 0 { DEFAULT_TOP_QTY } else { qty.min(MAX_TOP_QTY) })
}

/// Builds the log table name from a prefix, keeping only `[a-z0-9_]`.
#[must_use]
pub fn table_name(prefix: &str) -> String {
    let prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    format!("{prefix}eri_file_library")
}

/// Download log store.
#[derive(Debug, Clone)]
pub struct DownloadLog {
    db: Database,
    cache: Arc<CacheStore>,
    taxonomies: Taxonomies,
    table: String,
}

impl DownloadLog {
    #[must_use]
    pub fn new(db: Database, cache: Arc<CacheStore>, table_prefix: &str) -> Self {
        Self {
            taxonomies: Taxonomies::new(db.clone()),
            db,
            cache,
            table: table_name(table_prefix),
        }
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the log table and its indexes when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if DDL fails.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn ensure_table(&self) -> Result<()> {
        let table = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                user_ip VARCHAR(45) NULL,
                file_id INTEGER NOT NULL,
                time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        ))
        .execute(self.db.pool())
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_user_id ON {table}(user_id)"
        ))
        .execute(self.db.pool())
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_file_id ON {table}(file_id)"
        ))
        .execute(self.db.pool())
        .await?;
        debug!("download log table ready");
        Ok(())
    }

    /// Drops the log table and flushes cached aggregates.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if DDL fails.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn drop_table(&self) -> Result<()> {
        self.clear_all_cache();
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(self.db.pool())
            .await?;
        info!("download log table dropped");
        Ok(())
    }

    /// Whether the log table currently exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the lookup fails.
    pub async fn table_exists(&self) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Appends a row stamped with the current local time.
    ///
    /// The address is stored only for guests (`user_id == 0`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the insert fails.
    pub async fn add_record(&self, user_id: i64, user_ip: Option<&str>, file_id: i64) -> Result<i64> {
        self.add_record_at(user_id, user_ip, file_id, Local::now().naive_local())
            .await
    }

    /// Appends a row with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the insert fails.
    #[instrument(skip(self, user_ip))]
    pub async fn add_record_at(
        &self,
        user_id: i64,
        user_ip: Option<&str>,
        file_id: i64,
        time: NaiveDateTime,
    ) -> Result<i64> {
        self.clear_all_cache();
        let user_ip = if user_id == GUEST_USER_ID { user_ip } else { None };

        let (id,): (i64,) = sqlx::query_as(&format!(
            "INSERT INTO {} (user_id, user_ip, file_id, time) VALUES (?, ?, ?, ?) RETURNING id",
            self.table
        ))
        .bind(user_id)
        .bind(user_ip)
        .bind(file_id)
        .bind(time.format(TIME_FORMAT).to_string())
        .fetch_one(self.db.pool())
        .await?;
        Ok(id)
    }

    /// Deletes the rows of one user for one file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the delete fails.
    pub async fn delete_record(&self, user_id: i64, file_id: i64) -> Result<u64> {
        self.clear_all_cache();
        if !self.table_exists().await? {
            return Ok(0);
        }
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = ? AND file_id = ?",
            self.table
        ))
        .bind(user_id)
        .bind(file_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes every row for a file. Ids below 1 are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_file_records(&self, file_id: i64) -> Result<u64> {
        if file_id < 1 {
            return Ok(0);
        }
        self.clear_all_cache();
        if !self.table_exists().await? {
            return Ok(0);
        }
        let result = sqlx::query(&format!("DELETE FROM {} WHERE file_id = ?", self.table))
            .bind(file_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes every row for a user. Guest rows (id 0) are never bulk-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_user_records(&self, user_id: i64) -> Result<u64> {
        if user_id < 1 {
            return Ok(0);
        }
        self.clear_all_cache();
        if !self.table_exists().await? {
            return Ok(0);
        }
        let result = sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", self.table))
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Filtered log rows.
    ///
    /// A taxonomy filter that matches no files yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, query: &DownloadQuery) -> Result<Vec<DownloadRecord>> {
        let key = cache_key("get_downloads", query);
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let file_filter = if query.taxonomies.is_empty() {
            None
        } else {
            let ids = self.taxonomies.file_ids_by_terms(&query.taxonomies).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            Some(serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string()))
        };

        let order = query.order_by.map_or_else(
            || "id ASC".to_string(),
            |column| format!("{} DESC, id DESC", column.as_str()),
        );
        let rows = sqlx::query_as::<_, DownloadRecord>(&format!(
            r"SELECT id, user_id, user_ip, file_id, time
              FROM {}
              WHERE (?1 IS NULL OR user_id = ?1)
                AND (?2 IS NULL OR user_ip = ?2)
                AND (?3 IS NULL OR file_id = ?3)
                AND (?4 IS NULL OR time >= ?4)
                AND (?5 IS NULL OR time <= ?5)
                AND (?6 IS NULL OR file_id IN (SELECT value FROM json_each(?6)))
              ORDER BY {order}",
            self.table
        ))
        .bind(query.user_id)
        .bind(query.user_ip.as_deref())
        .bind(query.file_id)
        .bind(query.start_bound())
        .bind(query.end_bound())
        .bind(file_filter)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Most downloaded published files according to the log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn top_downloads(&self, qty: u32) -> Result<Vec<FileDownloads>> {
        let limit = normalize_qty(qty);
        let key = format!("top_downloads_{limit}");
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, FileDownloads>(&format!(
            r"SELECT d.file_id, f.title, COUNT(*) AS downloads
              FROM {} d
              JOIN files f ON f.id = d.file_id
              WHERE f.status = 'publish'
              GROUP BY d.file_id
              ORDER BY downloads DESC, d.file_id ASC
              LIMIT ?",
            self.table
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Most downloaded published files according to their stored counter.
    ///
    /// Works without the log table; files with a zero count are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn top_file_counts(&self, qty: u32) -> Result<Vec<FileDownloads>> {
        let limit = normalize_qty(qty);
        let key = format!("top_counts_{limit}");
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }

        let rows = sqlx::query_as::<_, FileDownloads>(
            r"SELECT id AS file_id, title, download_count AS downloads
              FROM files
              WHERE status = 'publish' AND download_count > 0
              ORDER BY download_count DESC, id ASC
              LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Published file ids ordered by logged downloads, most first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn sorted_file_ids(&self) -> Result<Vec<i64>> {
        let key = "sorted_file_ids";
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64,)> = sqlx::query_as(&format!(
            r"SELECT d.file_id
              FROM {} d
              JOIN files f ON f.id = d.file_id
              WHERE f.status = 'publish'
              GROUP BY d.file_id
              ORDER BY COUNT(*) DESC, d.file_id ASC",
            self.table
        ))
        .fetch_all(self.db.pool())
        .await?;

        let ids: Vec<i64> = rows.into_iter().map(|row| row.0).collect();
        self.cache.set(DOWNLOADS_GROUP, key, &ids);
        Ok(ids)
    }

    /// Logged download counts for the given files, most first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn download_counts(&self, file_ids: &[i64]) -> Result<Vec<FileCount>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let key = cache_key("download_counts", &file_ids);
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let ids_json = serde_json::to_string(file_ids).unwrap_or_else(|_| "[]".to_string());
        let rows = sqlx::query_as::<_, FileCount>(&format!(
            r"SELECT file_id, COUNT(*) AS count
              FROM {}
              WHERE file_id IN (SELECT value FROM json_each(?1))
              GROUP BY file_id
              ORDER BY count DESC, file_id ASC",
            self.table
        ))
        .bind(ids_json)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Registered users with the most downloads. Guests are excluded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn top_users(&self, qty: u32) -> Result<Vec<UserDownloads>> {
        let limit = normalize_qty(qty);
        let key = format!("top_users_downloads_{limit}");
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, UserDownloads>(&format!(
            r"SELECT d.user_id, u.display_name, COUNT(*) AS downloads
              FROM {} d
              JOIN users u ON u.id = d.user_id
              GROUP BY d.user_id
              ORDER BY downloads DESC, d.user_id ASC
              LIMIT ?",
            self.table
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Terms of one taxonomy ranked by downloads of published files.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn top_downloads_by_taxonomy(&self, taxonomy: &str, qty: u32) -> Result<Vec<TermDownloads>> {
        let limit = normalize_qty(qty);
        let key = format!("top_downloads_by_taxonomy_{taxonomy}_{limit}");
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, TermDownloads>(&format!(
            r"SELECT t.id AS term_id, t.name AS term_name, COUNT(d.file_id) AS downloads
              FROM {} d
              JOIN file_terms ft ON ft.file_id = d.file_id
              JOIN terms t ON t.id = ft.term_id
              JOIN files f ON f.id = d.file_id
              WHERE t.taxonomy = ? AND f.status = 'publish'
              GROUP BY t.id
              ORDER BY downloads DESC, t.id ASC
              LIMIT ?",
            self.table
        ))
        .bind(taxonomy)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Latest download time per file for one user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if the query fails.
    pub async fn user_download_history(
        &self,
        user_id: i64,
        start_date: Option<chrono::NaiveDate>,
        end_date: Option<chrono::NaiveDate>,
    ) -> Result<Vec<HistoryEntry>> {
        let key = cache_key("user_download_history", &(user_id, start_date, end_date));
        if let Some(hit) = self.cache.get(DOWNLOADS_GROUP, &key) {
            return Ok(hit);
        }
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, HistoryEntry>(&format!(
            r"SELECT file_id, MAX(time) AS last_download_time
              FROM {}
              WHERE user_id = ?1
                AND (?2 IS NULL OR time >= ?2)
                AND (?3 IS NULL OR time <= ?3)
              GROUP BY file_id
              ORDER BY last_download_time DESC, file_id ASC",
            self.table
        ))
        .bind(user_id)
        .bind(day_start(start_date))
        .bind(day_end(end_date))
        .fetch_all(self.db.pool())
        .await?;

        self.cache.set(DOWNLOADS_GROUP, &key, &rows);
        Ok(rows)
    }

    /// Flushes every cached download aggregate.
    pub fn clear_all_cache(&self) {
        self.cache.flush_group(DOWNLOADS_GROUP);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::taxonomy::FORMATS;

    struct Fixture {
        db: Database,
        cache: Arc<CacheStore>,
        log: DownloadLog,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        let cache = Arc::new(CacheStore::default());
        let log = DownloadLog::new(db.clone(), cache.clone(), "wp_");
        log.ensure_table().await.unwrap();
        Fixture { db, cache, log }
    }

    async fn insert_file(db: &Database, title: &str, status: &str) -> i64 {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO files (title, status) VALUES (?, ?) RETURNING id")
                .bind(title)
                .bind(status)
                .fetch_one(db.pool())
                .await
                .unwrap();
        id
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_table_name_strips_unsafe_prefix_chars() {
        assert_eq!(table_name("wp_"), "wp_eri_file_library");
        assert_eq!(table_name("x; --"), "xeri_file_library");
    }

    #[tokio::test]
    async fn test_ensure_and_drop_table() {
        let f = fixture().await;
        assert!(f.log.table_exists().await.unwrap());
        f.log.drop_table().await.unwrap();
        assert!(!f.log.table_exists().await.unwrap());
        assert!(f.log.get(&DownloadQuery::default()).await.unwrap().is_empty());
        assert_eq!(f.log.delete_file_records(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_record_keeps_ip_only_for_guests() {
        let f = fixture().await;
        let file = insert_file(&f.db, "Guide", "publish").await;

        f.log.add_record(0, Some("203.0.113.5"), file).await.unwrap();
        f.log.add_record(7, Some("198.51.100.9"), file).await.unwrap();

        let rows = f.log.get(&DownloadQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_ip.as_deref(), Some("203.0.113.5"));
        assert_eq!(rows[1].user_id, 7);
        assert_eq!(rows[1].user_ip, None);
    }

    #[tokio::test]
    async fn test_get_filters_by_date_range_inclusive() {
        let f = fixture().await;
        let file = insert_file(&f.db, "Guide", "publish").await;
        f.log.add_record_at(1, None, file, at(1, 0)).await.unwrap();
        f.log.add_record_at(1, None, file, at(15, 23)).await.unwrap();
        f.log.add_record_at(1, None, file, at(16, 0)).await.unwrap();

        let rows = f
            .log
            .get(&DownloadQuery {
                start_date: NaiveDate::from_ymd_opt(2024, 10, 1),
                end_date: NaiveDate::from_ymd_opt(2024, 10, 15),
                order_by: Some(DownloadOrder::Time),
                ..DownloadQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, "2024-10-15 23:00:00");
        assert_eq!(rows[1].time, "2024-10-01 00:00:00");
    }

    #[tokio::test]
    async fn test_get_taxonomy_filter_without_matches_is_empty() {
        let f = fixture().await;
        let file = insert_file(&f.db, "Guide", "publish").await;
        f.log.add_record(0, None, file).await.unwrap();

        let mut taxonomies = BTreeMap::new();
        taxonomies.insert(FORMATS.to_string(), "pdf".to_string());
        let rows = f
            .log
            .get(&DownloadQuery {
                taxonomies: taxonomies.clone(),
                ..DownloadQuery::default()
            })
            .await
            .unwrap();
        assert!(rows.is_empty());

        let tax = Taxonomies::new(f.db.clone());
        tax.set_file_terms(file, FORMATS, &["pdf".to_string()])
            .await
            .unwrap();
        f.log.clear_all_cache();
        let rows = f
            .log
            .get(&DownloadQuery {
                taxonomies,
                ..DownloadQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_are_cached_until_next_write() {
        let f = fixture().await;
        let file = insert_file(&f.db, "Guide", "publish").await;
        f.log.add_record(0, None, file).await.unwrap();

        assert_eq!(f.log.top_downloads(10).await.unwrap()[0].downloads, 1);
        assert_eq!(f.cache.len(DOWNLOADS_GROUP), 1);

        // A write that bypasses the store is invisible until the group is flushed.
        sqlx::query(&format!(
            "INSERT INTO {} (user_id, file_id) VALUES (0, ?)",
            f.log.table()
        ))
        .bind(file)
        .execute(f.db.pool())
        .await
        .unwrap();
        assert_eq!(f.log.top_downloads(10).await.unwrap()[0].downloads, 1);

        f.log.add_record(0, None, file).await.unwrap();
        assert!(f.cache.is_empty(DOWNLOADS_GROUP));
        assert_eq!(f.log.top_downloads(10).await.unwrap()[0].downloads, 3);
    }

    #[tokio::test]
    async fn test_top_downloads_skips_unpublished_and_orphans() {
        let f = fixture().await;
        let published = insert_file(&f.db, "Published", "publish").await;
        let draft = insert_file(&f.db, "Draft", "draft").await;
        f.log.add_record(0, None, published).await.unwrap();
        f.log.add_record(0, None, draft).await.unwrap();
        f.log.add_record(0, None, 9999).await.unwrap();

        let top = f.log.top_downloads(10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].title, "Published");
        assert_eq!(f.log.sorted_file_ids().await.unwrap(), vec![published]);
    }

    #[tokio::test]
    async fn test_sorted_ids_and_counts() {
        let f = fixture().await;
        let a = insert_file(&f.db, "A", "publish").await;
        let b = insert_file(&f.db, "B", "publish").await;
        for _ in 0..3 {
            f.log.add_record(0, None, b).await.unwrap();
        }
        f.log.add_record(0, None, a).await.unwrap();

        assert_eq!(f.log.sorted_file_ids().await.unwrap(), vec![b, a]);
        let counts = f.log.download_counts(&[a, b]).await.unwrap();
        assert_eq!(
            counts,
            vec![
                FileCount { file_id: b, count: 3 },
                FileCount { file_id: a, count: 1 }
            ]
        );
        let only_a = f.log.download_counts(&[a]).await.unwrap();
        assert_eq!(only_a, vec![FileCount { file_id: a, count: 1 }]);
    }

    #[tokio::test]
    async fn test_top_file_counts_uses_stored_counter() {
        let f = fixture().await;
        let a = insert_file(&f.db, "A", "publish").await;
        let _zero = insert_file(&f.db, "Zero", "publish").await;
        sqlx::query("UPDATE files SET download_count = 5 WHERE id = ?")
            .bind(a)
            .execute(f.db.pool())
            .await
            .unwrap();

        let top = f.log.top_file_counts(10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].downloads, 5);
    }

    #[tokio::test]
    async fn test_user_history_latest_per_file() {
        let f = fixture().await;
        let a = insert_file(&f.db, "A", "publish").await;
        let b = insert_file(&f.db, "B", "publish").await;
        f.log.add_record_at(4, None, a, at(1, 9)).await.unwrap();
        f.log.add_record_at(4, None, b, at(2, 9)).await.unwrap();
        f.log.add_record_at(4, None, a, at(3, 9)).await.unwrap();
        f.log.add_record_at(5, None, b, at(9, 9)).await.unwrap();

        let history = f.log.user_download_history(4, None, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].file_id, a);
        assert_eq!(history[0].last_download_time, "2024-10-03 09:00:00");
        assert_eq!(history[1].file_id, b);

        let early = f
            .log
            .user_download_history(4, None, NaiveDate::from_ymd_opt(2024, 10, 2))
            .await
            .unwrap();
        assert_eq!(early[0].file_id, b);
        assert_eq!(early[1].last_download_time, "2024-10-01 09:00:00");
    }

    #[tokio::test]
    async fn test_delete_user_records_ignores_guests() {
        let f = fixture().await;
        let a = insert_file(&f.db, "A", "publish").await;
        f.log.add_record(0, None, a).await.unwrap();
        f.log.add_record(3, None, a).await.unwrap();

        assert_eq!(f.log.delete_user_records(0).await.unwrap(), 0);
        assert_eq!(f.log.delete_user_records(3).await.unwrap(), 1);
        assert_eq!(f.log.get(&DownloadQuery::default()).await.unwrap().len(), 1);
        assert_eq!(f.log.delete_record(0, a).await.unwrap(), 1);
    }
}
