//! Persisted runtime options.
//!
//! Options are stored as text in the `options` table under the same keys the
//! admin settings page uses. [`Settings::load`] reads them all into a typed
//! [`LibrarySettings`] snapshot with defaults applied, which is what the
//! renderers and services consume.

mod icon;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, instrument, warn};

pub use icon::IconType;

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::helpers::{parse_bool, sanitize_key, strip_tags};

/// Default upload folder, named after the file post type.
pub const DEFAULT_FOLDER: &str = "erifl-files";

/// Default download log page size.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// Largest accepted download log page size.
pub const MAX_PER_PAGE: u32 = 500;

/// Default shortcode prefix.
pub const DEFAULT_SHORTCODE_PREFIX: &str = "erifl_";

/// Option keys.
pub mod keys {
    pub const ADMIN_MENU_LABEL: &str = "erifl_admin_menu_label";
    pub const NO_ACCESS_MSG: &str = "erifl_no_access_msg";
    pub const ADD_TAXONOMIES: &str = "erifl_add_taxonomies";
    pub const PRE_TITLE: &str = "erifl_pre_title";
    pub const POST_TITLE: &str = "erifl_post_title";
    pub const BTN_HIDE_FORMAT: &str = "erifl_btn_hide_format";
    pub const ADMIN_PARAM: &str = "erifl_admin_param";
    pub const ICON_TYPE: &str = "erifl_icon_type";
    pub const FOLDER: &str = "erifl_folder";
    pub const INCLUDE_URLS: &str = "erifl_include_urls";
    pub const TRACKING: &str = "erifl_tracking";
    pub const DELETE_TABLE: &str = "erifl_delete_table";
    pub const PER_PAGE: &str = "erifl_per_page";

    /// Every key the settings page manages, in display order.
    pub const ALL: [&str; 13] = [
        ADMIN_MENU_LABEL,
        NO_ACCESS_MSG,
        ADD_TAXONOMIES,
        PRE_TITLE,
        POST_TITLE,
        BTN_HIDE_FORMAT,
        ADMIN_PARAM,
        ICON_TYPE,
        FOLDER,
        INCLUDE_URLS,
        TRACKING,
        DELETE_TABLE,
        PER_PAGE,
    ];
}

/// Shortcode `type` shown in the admin copy-and-paste snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminParam {
    Link,
    Button,
    Icon,
    Url,
    Full,
}

impl AdminParam {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Button => "button",
            Self::Icon => "icon",
            Self::Url => "url",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for AdminParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminParam {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "link" => Ok(Self::Link),
            "button" => Ok(Self::Button),
            "icon" => Ok(Self::Icon),
            "url" => Ok(Self::Url),
            "full" => Ok(Self::Full),
            _ => Err(format!("invalid admin param: {s}")),
        }
    }
}

/// Typed view of every option, defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySettings {
    pub admin_menu_label: String,
    pub no_access_msg: String,
    pub additional_taxonomies: Vec<String>,
    pub pre_title: String,
    pub post_title: String,
    pub hide_format: bool,
    pub admin_param: AdminParam,
    pub icon_type: IconType,
    pub folder: String,
    pub include_urls: bool,
    pub tracking: bool,
    pub delete_table: bool,
    pub per_page: u32,
    pub shortcode_prefix: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            admin_menu_label: "Files".to_string(),
            no_access_msg: "<em>You do not have permission to access this file.</em>".to_string(),
            additional_taxonomies: Vec::new(),
            pre_title: "Download ".to_string(),
            post_title: "!".to_string(),
            hide_format: false,
            admin_param: AdminParam::Link,
            icon_type: IconType::LogoFull,
            folder: DEFAULT_FOLDER.to_string(),
            include_urls: false,
            tracking: false,
            delete_table: false,
            per_page: DEFAULT_PER_PAGE,
            shortcode_prefix: DEFAULT_SHORTCODE_PREFIX.to_string(),
        }
    }
}

impl LibrarySettings {
    /// Builds a snapshot from stored `(name, value)` pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (name, value) in pairs {
            settings.apply(name, value);
        }
        settings
    }

    fn apply(&mut self, name: &str, value: &str) {
        match name {
            keys::ADMIN_MENU_LABEL => {
                let label = value.trim();
                if !label.is_empty() {
                    self.admin_menu_label = label.to_string();
                }
            }
            keys::NO_ACCESS_MSG => self.no_access_msg = value.to_string(),
            keys::ADD_TAXONOMIES => {
                self.additional_taxonomies = value
                    .split(',')
                    .map(str::trim)
                    .filter(|slug| !slug.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            keys::PRE_TITLE => self.pre_title = value.to_string(),
            keys::POST_TITLE => self.post_title = value.to_string(),
            keys::BTN_HIDE_FORMAT => self.hide_format = parse_bool(value),
            keys::ADMIN_PARAM => {
                self.admin_param = sanitize_key(value).parse().unwrap_or(AdminParam::Link);
            }
            keys::ICON_TYPE => self.icon_type = IconType::parse(value),
            keys::FOLDER => {
                let folder = sanitize_key(value);
                if !folder.is_empty() {
                    self.folder = folder;
                }
            }
            keys::INCLUDE_URLS => self.include_urls = parse_bool(value),
            keys::TRACKING => self.tracking = parse_bool(value),
            keys::DELETE_TABLE => self.delete_table = parse_bool(value),
            keys::PER_PAGE => {
                if let Ok(per_page) = value.trim().parse::<u32>()
                    && (1..=MAX_PER_PAGE).contains(&per_page)
                {
                    self.per_page = per_page;
                }
            }
            _ => {}
        }
    }

    /// Shortcode tag for single files, `erifl_file` by default.
    #[must_use]
    pub fn shortcode_tag(&self) -> String {
        format!("{}file", self.shortcode_prefix)
    }

    /// Copy-and-paste snippet shown next to a file in the admin list.
    #[must_use]
    pub fn shortcode_snippet(&self, file_id: i64) -> String {
        let tag = self.shortcode_tag();
        match self.admin_param {
            AdminParam::Url => format!("[{tag} id=\"{file_id}\"]"),
            param => format!("[{tag} id=\"{file_id}\" type=\"{param}\"]"),
        }
    }
}

#[derive(Debug, FromRow)]
struct OptionRow {
    name: String,
    value: String,
}

/// Option store backed by the `options` table.
#[derive(Debug, Clone)]
pub struct Settings {
    db: Database,
}

impl Settings {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Reads a raw option value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM options WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(value.map(|row| row.0))
    }

    /// Stores an option after sanitizing it for its key.
    ///
    /// The folder option is handled by [`Settings::set_folder_name`], which
    /// also moves the folder on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for unknown keys or rejected values.
    #[instrument(skip(self, value))]
    pub async fn set(&self, name: &str, value: &str) -> Result<()> {
        let sanitized = sanitize_option(name, value)?;
        self.put(name, &sanitized).await
    }

    async fn put(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            r"INSERT INTO options (name, value) VALUES (?, ?)
              ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Removes an option so its default applies again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM options WHERE name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Loads every option into a typed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn load(&self) -> Result<LibrarySettings> {
        let rows = sqlx::query_as::<_, OptionRow>("SELECT name, value FROM options")
            .fetch_all(self.db.pool())
            .await?;
        Ok(LibrarySettings::from_pairs(
            rows.iter().map(|row| (row.name.as_str(), row.value.as_str())),
        ))
    }

    /// Whether downloads are written to the log table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn is_tracking(&self) -> Result<bool> {
        Ok(self
            .get(keys::TRACKING)
            .await?
            .is_some_and(|value| parse_bool(&value)))
    }

    /// Current upload folder name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn folder_name(&self) -> Result<String> {
        let stored = self.get(keys::FOLDER).await?.map(|v| sanitize_key(&v));
        Ok(stored
            .filter(|folder| !folder.is_empty())
            .unwrap_or_else(|| DEFAULT_FOLDER.to_string()))
    }

    /// Renames the upload folder and stores the new name.
    ///
    /// A blank value falls back to the default folder. When the old folder
    /// exists on disk it is moved; otherwise only the option changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Filesystem`] if the move fails, in which case the
    /// option is left unchanged.
    #[instrument(skip(self, uploads_dir))]
    pub async fn set_folder_name(&self, uploads_dir: &Path, requested: &str) -> Result<String> {
        let mut new_folder = sanitize_key(requested);
        if new_folder.is_empty() {
            new_folder = DEFAULT_FOLDER.to_string();
        }

        let old_folder = self.folder_name().await?;
        if new_folder != old_folder {
            let old_path = uploads_dir.join(&old_folder);
            let new_path = uploads_dir.join(&new_folder);
            if tokio::fs::try_exists(&old_path).await.unwrap_or(false) {
                if tokio::fs::try_exists(&new_path).await.unwrap_or(false) {
                    warn!(from = %old_path.display(), to = %new_path.display(), "target folder already exists");
                    return Err(StoreError::invalid(
                        "folder",
                        new_folder,
                        "a folder with that name already exists",
                    ));
                }
                tokio::fs::rename(&old_path, &new_path)
                    .await
                    .map_err(|err| StoreError::filesystem(&old_path, &err))?;
                info!(from = %old_folder, to = %new_folder, "upload folder renamed");
            }
        }

        self.put(keys::FOLDER, &new_folder).await?;
        Ok(new_folder)
    }

    /// Stores the download log page size chosen in the admin view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when out of range.
    pub async fn set_per_page(&self, per_page: u32) -> Result<()> {
        self.set(keys::PER_PAGE, &per_page.to_string()).await
    }
}

fn sanitize_option(name: &str, value: &str) -> Result<String> {
    match name {
        keys::ADMIN_MENU_LABEL | keys::PRE_TITLE | keys::POST_TITLE => {
            Ok(strip_tags(value).replace(['\r', '\n', '\t'], " "))
        }
        keys::NO_ACCESS_MSG => Ok(value.to_string()),
        keys::ADD_TAXONOMIES => Ok(value
            .split(',')
            .map(sanitize_key)
            .filter(|slug| !slug.is_empty())
            .collect::<Vec<_>>()
            .join(", ")),
        keys::BTN_HIDE_FORMAT | keys::INCLUDE_URLS | keys::TRACKING | keys::DELETE_TABLE => {
            Ok(if parse_bool(value) { "1" } else { "0" }.to_string())
        }
        keys::ADMIN_PARAM => {
            let param: AdminParam = sanitize_key(value)
                .parse()
                .map_err(|reason: String| StoreError::invalid("admin_param", value, reason))?;
            Ok(param.as_str().to_string())
        }
        keys::ICON_TYPE => Ok(IconType::parse(value).as_option_value()),
        keys::FOLDER => Err(StoreError::invalid(
            "option",
            name,
            "use set_folder_name to change the upload folder",
        )),
        keys::PER_PAGE => match value.trim().parse::<u32>() {
            Ok(per_page) if (1..=MAX_PER_PAGE).contains(&per_page) => Ok(per_page.to_string()),
            _ => Err(StoreError::invalid(
                "per_page",
                value,
                format!("expected a number between 1 and {MAX_PER_PAGE}"),
            )),
        },
        _ => Err(StoreError::invalid("option", name, "unknown option key")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn settings() -> Settings {
        Settings::new(Database::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_stored() {
        let loaded = settings().await.load().await.unwrap();
        assert_eq!(loaded, LibrarySettings::default());
        assert_eq!(loaded.admin_menu_label, "Files");
        assert_eq!(loaded.pre_title, "Download ");
        assert_eq!(loaded.post_title, "!");
        assert_eq!(loaded.folder, DEFAULT_FOLDER);
        assert!(!loaded.tracking);
    }

    #[tokio::test]
    async fn test_set_tracking_truthy_values() {
        let store = settings().await;
        store.set(keys::TRACKING, "on").await.unwrap();
        assert!(store.is_tracking().await.unwrap());
        assert_eq!(store.get(keys::TRACKING).await.unwrap().as_deref(), Some("1"));

        store.set(keys::TRACKING, "nope").await.unwrap();
        assert!(!store.is_tracking().await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_pre_title_is_kept() {
        let store = settings().await;
        store.set(keys::PRE_TITLE, "").await.unwrap();
        assert_eq!(store.load().await.unwrap().pre_title, "");
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let err = settings().await.set("erifl_colour", "red").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_invalid_admin_param_rejected() {
        let store = settings().await;
        assert!(store.set(keys::ADMIN_PARAM, "tooltip").await.is_err());
        store.set(keys::ADMIN_PARAM, "Button").await.unwrap();
        assert_eq!(store.load().await.unwrap().admin_param, AdminParam::Button);
    }

    #[tokio::test]
    async fn test_additional_taxonomies_split() {
        let store = settings().await;
        store
            .set(keys::ADD_TAXONOMIES, "grade-levels, Subjects ,,")
            .await
            .unwrap();
        assert_eq!(
            store.load().await.unwrap().additional_taxonomies,
            vec!["grade-levels".to_string(), "subjects".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_restores_default() {
        let store = settings().await;
        store.set(keys::PER_PAGE, "10").await.unwrap();
        assert_eq!(store.load().await.unwrap().per_page, 10);
        assert!(store.delete(keys::PER_PAGE).await.unwrap());
        assert_eq!(store.load().await.unwrap().per_page, DEFAULT_PER_PAGE);
    }

    #[tokio::test]
    async fn test_per_page_range() {
        let store = settings().await;
        assert!(store.set_per_page(0).await.is_err());
        assert!(store.set_per_page(MAX_PER_PAGE + 1).await.is_err());
        store.set_per_page(50).await.unwrap();
        assert_eq!(store.load().await.unwrap().per_page, 50);
    }

    #[tokio::test]
    async fn test_folder_rename_moves_directory() {
        let store = settings().await;
        let uploads = tempfile::tempdir().unwrap();
        let old = uploads.path().join(DEFAULT_FOLDER);
        std::fs::create_dir_all(&old).unwrap();
        std::fs::write(old.join("guide.pdf"), b"%PDF").unwrap();

        let folder = store
            .set_folder_name(uploads.path(), "Library Files")
            .await
            .unwrap();

        assert_eq!(folder, "libraryfiles");
        assert!(!old.exists());
        assert!(uploads.path().join("libraryfiles/guide.pdf").exists());
        assert_eq!(store.folder_name().await.unwrap(), "libraryfiles");
    }

    #[tokio::test]
    async fn test_blank_folder_falls_back_to_default() {
        let store = settings().await;
        let uploads = tempfile::tempdir().unwrap();
        store.set_folder_name(uploads.path(), "docs").await.unwrap();
        let folder = store.set_folder_name(uploads.path(), "  ").await.unwrap();
        assert_eq!(folder, DEFAULT_FOLDER);
    }

    #[tokio::test]
    async fn test_folder_option_not_settable_directly() {
        assert!(settings().await.set(keys::FOLDER, "docs").await.is_err());
    }

    #[test]
    fn test_shortcode_snippet_uses_admin_param() {
        let mut settings = LibrarySettings::default();
        assert_eq!(settings.shortcode_snippet(12), "[erifl_file id=\"12\" type=\"link\"]");
        settings.admin_param = AdminParam::Url;
        assert_eq!(settings.shortcode_snippet(12), "[erifl_file id=\"12\"]");
    }

    #[test]
    fn test_strip_tags_on_labels() {
        assert_eq!(
            sanitize_option(keys::ADMIN_MENU_LABEL, "<b>Docs</b>").unwrap(),
            "Docs"
        );
    }
}
