//! File entries: metadata, stored uploads, listing queries and the access gate.
//!
//! Each entry owns at most one file inside `uploads_dir/<folder>/`, where the
//! folder name comes from settings. File lists are cached in the
//! [`FILE_LISTS_GROUP`] group and flushed on every write through this store.
//! The denormalized `download_count` also feeds cached download aggregates,
//! so bumping it flushes [`DOWNLOADS_GROUP`] too.

mod query;
mod record;
mod requirements;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, instrument, warn};

pub use query::{DEFAULT_LIST_PER_PAGE, FileList, FileListQuery, FileOrderBy, SortOrder};
pub use record::{FileRecord, FileStatus, FileUpdate, NewFile, UploadNotices};
pub use upload::UploadError;

use crate::cache::{CacheStore, DOWNLOADS_GROUP, FILE_LISTS_GROUP, cache_key};
use crate::db::Database;
use crate::downloads::{DownloadLogRepository, TIME_FORMAT};
use crate::error::{Result, StoreError, check_file_affected};
use crate::helpers::{sanitize_key, sanitize_text_field};
use crate::hooks::Hooks;
use crate::settings::Settings;
use crate::taxonomy::{FORMATS, RESOURCE_TYPES, TARGET_AUDIENCES, Taxonomies};
use crate::users::Users;
use record::join_roles;

pub(crate) const FILE_COLUMNS: &str = "id, title, status, author_id, file_name, description, \
     download_count, required_roles, required_meta_key, last_downloaded, last_downloaded_by, \
     featured_image, upload_error, upload_error_msg, created_at, updated_at";

fn json_list<T: serde::Serialize>(items: &[T]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        serde_json::to_string(items).ok()
    }
}

/// File entry store.
#[derive(Clone)]
pub struct Files {
    db: Database,
    cache: Arc<CacheStore>,
    taxonomies: Taxonomies,
    users: Users,
    settings: Settings,
    log: Arc<dyn DownloadLogRepository>,
    hooks: Arc<Hooks>,
    uploads_dir: PathBuf,
    base_url: String,
}

impl std::fmt::Debug for Files {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Files")
            .field("uploads_dir", &self.uploads_dir)
            .field("base_url", &self.base_url)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Files {
    #[must_use]
    pub fn new(
        db: Database,
        cache: Arc<CacheStore>,
        log: Arc<dyn DownloadLogRepository>,
        hooks: Arc<Hooks>,
        uploads_dir: PathBuf,
        base_url: String,
    ) -> Self {
        Self {
            taxonomies: Taxonomies::new(db.clone()),
            users: Users::new(db.clone()),
            settings: Settings::new(db.clone()),
            db,
            cache,
            log,
            hooks,
            uploads_dir,
            base_url,
        }
    }

    /// Creates an entry without a stored file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a blank title.
    #[instrument(skip(self, file), fields(title = %file.title))]
    pub async fn create(&self, file: &NewFile<'_>) -> Result<FileRecord> {
        let title = sanitize_text_field(file.title);
        if title.is_empty() {
            return Err(StoreError::invalid("title", file.title, "must not be empty"));
        }
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (title, status, author_id, description, required_roles, required_meta_key)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(&title)
        .bind(file.status.as_str())
        .bind(file.author_id)
        .bind(sanitize_text_field(file.description))
        .bind(join_roles(file.required_roles))
        .bind(sanitize_key(file.required_meta_key))
        .fetch_one(self.db.pool())
        .await?;

        self.flush_lists();
        debug!(id = record.id, "file created");
        Ok(record)
    }

    /// Fetches an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(file)
    }

    /// Fetches an entry that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    pub async fn require(&self, id: i64) -> Result<FileRecord> {
        self.get(id).await?.ok_or(StoreError::FileNotFound(id))
    }

    /// Fetches several entries, in id order. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get_many(&self, ids: &[i64]) -> Result<Vec<FileRecord>> {
        let Some(ids_json) = json_list(ids) else {
            return Ok(Vec::new());
        };
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE id IN (SELECT value FROM json_each(?)) ORDER BY id"
        ))
        .bind(ids_json)
        .fetch_all(self.db.pool())
        .await?;
        Ok(files)
    }

    /// Every entry, optionally limited to one status, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list(&self, status: Option<FileStatus>) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE (?1 IS NULL OR status = ?1) ORDER BY id"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(files)
    }

    /// Applies a partial update. Text is sanitized, counts below zero become 0,
    /// an empty featured image clears it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids and
    /// [`StoreError::InvalidInput`] for a blank title.
    #[instrument(skip(self, update))]
    pub async fn update_details(&self, id: i64, update: &FileUpdate) -> Result<FileRecord> {
        let title = match update.title.as_deref().map(sanitize_text_field) {
            Some(title) if title.is_empty() => {
                return Err(StoreError::invalid("title", "", "must not be empty"));
            }
            other => other,
        };

        let result = sqlx::query(
            r"UPDATE files SET
                title = COALESCE(?1, title),
                status = COALESCE(?2, status),
                description = COALESCE(?3, description),
                download_count = COALESCE(?4, download_count),
                required_roles = COALESCE(?5, required_roles),
                required_meta_key = COALESCE(?6, required_meta_key),
                featured_image = CASE WHEN ?7 IS NULL THEN featured_image
                                      WHEN ?7 = '' THEN NULL ELSE ?7 END,
                updated_at = datetime('now')
              WHERE id = ?8",
        )
        .bind(title)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.description.as_deref().map(sanitize_text_field))
        .bind(update.download_count.map(|count| count.max(0)))
        .bind(update.required_roles.as_deref().map(join_roles))
        .bind(update.required_meta_key.as_deref().map(sanitize_key))
        .bind(update.featured_image.as_deref().map(str::trim))
        .bind(id)
        .execute(self.db.pool())
        .await?;
        check_file_affected(id, result.rows_affected())?;

        self.flush_lists();
        if update.download_count.is_some() || update.status.is_some() {
            self.cache.flush_group(DOWNLOADS_GROUP);
        }
        self.require(id).await
    }

    /// Overwrites the requirements of many entries at once. Empty values leave
    /// the matching column untouched; an empty id list changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, roles))]
    pub async fn bulk_edit(&self, ids: &[i64], roles: &[String], meta_key: &str) -> Result<u64> {
        let roles = join_roles(roles);
        let meta_key = sanitize_key(meta_key);
        let Some(ids_json) = json_list(ids) else {
            return Ok(0);
        };
        if roles.is_empty() && meta_key.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r"UPDATE files SET
                required_roles = COALESCE(?1, required_roles),
                required_meta_key = COALESCE(?2, required_meta_key),
                updated_at = datetime('now')
              WHERE id IN (SELECT value FROM json_each(?3))",
        )
        .bind((!roles.is_empty()).then_some(roles))
        .bind((!meta_key.is_empty()).then_some(meta_key))
        .bind(ids_json)
        .execute(self.db.pool())
        .await?;

        self.flush_lists();
        info!(updated = result.rows_affected(), "bulk edit applied");
        Ok(result.rows_affected())
    }

    /// Removes an entry, its stored file, its terms and its download log rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let file = self.require(id).await?;

        if let Some(name) = file.file_name.as_deref() {
            let path = self.folder_path().await?.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "stored file removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "could not remove stored file"),
            }
        }

        let removed = self.log.delete_file_records(id).await?;
        self.taxonomies.clear_file_terms(id).await?;
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_file_affected(id, result.rows_affected())?;

        self.flush_lists();
        self.cache.flush_group(DOWNLOADS_GROUP);
        info!(id, log_rows = removed, "file deleted");
        Ok(())
    }

    /// Bumps the download counter by one and stamps who downloaded it when.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    pub async fn increment_download_count(&self, id: i64, user_id: i64) -> Result<FileRecord> {
        let now = Local::now().naive_local().format(TIME_FORMAT).to_string();
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET download_count = download_count + 1,
                 last_downloaded = ?, last_downloaded_by = ?
             WHERE id = ?
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(now)
        .bind(user_id)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(StoreError::FileNotFound(id))?;

        self.flush_lists();
        self.cache.flush_group(DOWNLOADS_GROUP);
        Ok(file)
    }

    /// Directory holding the stored files.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the folder setting cannot be read.
    pub async fn folder_path(&self) -> Result<PathBuf> {
        Ok(self.uploads_dir.join(self.settings.folder_name().await?))
    }

    /// Public URL of the upload folder, with a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the folder setting cannot be read.
    pub async fn folder_url(&self) -> Result<String> {
        let base = self.hooks.base_url(self.base_url.clone());
        let folder = self.settings.folder_name().await?;
        Ok(format!("{}/{folder}/", base.trim_end_matches('/')))
    }

    /// Public URL of an entry's file; `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    pub async fn file_url(&self, id: i64) -> Result<Option<String>> {
        let file = self.require(id).await?;
        self.url_for(&file).await
    }

    pub(crate) async fn url_for(&self, file: &FileRecord) -> Result<Option<String>> {
        match file.file_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(Some(format!("{}{name}", self.folder_url().await?))),
            _ => Ok(None),
        }
    }

    /// Filesystem path of an entry's file; `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileNotFound`] for unknown ids.
    pub async fn file_path(&self, id: i64) -> Result<Option<PathBuf>> {
        let file = self.require(id).await?;
        match file.file_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(Some(self.folder_path().await?.join(name))),
            _ => Ok(None),
        }
    }

    /// One page of files plus the total match count.
    ///
    /// With explicit `file_ids` the page is cut from that list in memory and
    /// the count is the list length. Otherwise only published files are
    /// searched: term filters of different taxonomies must all match (any
    /// slug within one taxonomy), and every listed role or meta key must occur
    /// in the file's requirements. A `per_page` of 0 returns everything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn get_files(&self, query: &FileListQuery) -> Result<FileList> {
        let key = cache_key("search_results", query);
        if let Some(hit) = self.cache.get(FILE_LISTS_GROUP, &key) {
            return Ok(hit);
        }

        let list = if query.file_ids.is_empty() {
            self.search_files(query).await?
        } else {
            let offset = query.offset as usize;
            let take = if query.per_page == 0 {
                usize::MAX
            } else {
                query.per_page as usize
            };
            let page: Vec<i64> = query.file_ids.iter().copied().skip(offset).take(take).collect();
            let mut files = Vec::with_capacity(page.len());
            for id in page {
                if let Some(file) = self.get(id).await? {
                    files.push(file);
                }
            }
            FileList {
                files,
                count: i64::try_from(query.file_ids.len()).unwrap_or(i64::MAX),
            }
        };

        self.cache.set(FILE_LISTS_GROUP, &key, &list);
        Ok(list)
    }

    async fn search_files(&self, query: &FileListQuery) -> Result<FileList> {
        const FILTERS: &str = r"
            status = 'publish'
            AND (?1 IS NULL OR id IN (SELECT ft.file_id FROM file_terms ft JOIN terms t ON t.id = ft.term_id
                 WHERE t.taxonomy = ?6 AND t.slug IN (SELECT value FROM json_each(?1))))
            AND (?2 IS NULL OR id IN (SELECT ft.file_id FROM file_terms ft JOIN terms t ON t.id = ft.term_id
                 WHERE t.taxonomy = ?7 AND t.slug IN (SELECT value FROM json_each(?2))))
            AND (?3 IS NULL OR id IN (SELECT ft.file_id FROM file_terms ft JOIN terms t ON t.id = ft.term_id
                 WHERE t.taxonomy = ?8 AND t.slug IN (SELECT value FROM json_each(?3))))
            AND (?4 IS NULL OR NOT EXISTS (SELECT 1 FROM json_each(?4) r
                 WHERE files.required_roles NOT LIKE '%' || r.value || '%'))
            AND (?5 IS NULL OR NOT EXISTS (SELECT 1 FROM json_each(?5) m
                 WHERE files.required_meta_key NOT LIKE '%' || m.value || '%'))";

        let resource_types = json_list(&query.resource_types);
        let target_audiences = json_list(&query.target_audiences);
        let formats = json_list(&query.formats);
        let roles = json_list(&query.required_roles);
        let meta_keys = json_list(&query.required_meta_keys);

        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM files WHERE {FILTERS}"))
            .bind(resource_types.as_deref())
            .bind(target_audiences.as_deref())
            .bind(formats.as_deref())
            .bind(roles.as_deref())
            .bind(meta_keys.as_deref())
            .bind(RESOURCE_TYPES)
            .bind(TARGET_AUDIENCES)
            .bind(FORMATS)
            .fetch_one(self.db.pool())
            .await?;

        let limit = if query.per_page == 0 {
            -1
        } else {
            i64::from(query.per_page)
        };
        let order = query.order.as_str();
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE {FILTERS}
             ORDER BY {} {order}, id {order}
             LIMIT ?9 OFFSET ?10",
            query.order_by.column()
        ))
        .bind(resource_types.as_deref())
        .bind(target_audiences.as_deref())
        .bind(formats.as_deref())
        .bind(roles.as_deref())
        .bind(meta_keys.as_deref())
        .bind(RESOURCE_TYPES)
        .bind(TARGET_AUDIENCES)
        .bind(FORMATS)
        .bind(limit)
        .bind(i64::from(query.offset))
        .fetch_all(self.db.pool())
        .await?;

        Ok(FileList { files, count })
    }

    /// Drops every cached file list.
    pub fn flush_lists(&self) {
        self.cache.flush_group(FILE_LISTS_GROUP);
    }

    #[must_use]
    pub fn taxonomies(&self) -> &Taxonomies {
        &self.taxonomies
    }

    #[must_use]
    pub fn users(&self) -> &Users {
        &self.users
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}
