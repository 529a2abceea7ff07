//! Hierarchical taxonomies attached to files.
//!
//! Three taxonomies are always present (formats, resource types and target
//! audiences); sites may add more through the additional-taxonomies option.
//! Resource type terms can carry a featured image used as a fallback
//! thumbnail when rendering files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::helpers::sanitize_title;
use crate::settings::LibrarySettings;

pub const FORMATS: &str = "erifl-formats";
pub const RESOURCE_TYPES: &str = "erifl-resource-types";
pub const TARGET_AUDIENCES: &str = "erifl-target-audiences";

/// Taxonomies registered for every installation.
pub const BUILTIN: [&str; 3] = [FORMATS, RESOURCE_TYPES, TARGET_AUDIENCES];

/// A term within a taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Term {
    pub id: i64,
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
    /// Parent term id, 0 for top-level terms.
    pub parent: i64,
    pub featured_image: Option<String>,
}

impl Term {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent == 0
    }
}

/// Human label for a taxonomy column header.
#[must_use]
pub fn taxonomy_label(taxonomy: &str) -> String {
    match taxonomy {
        FORMATS => "Formats".to_string(),
        RESOURCE_TYPES => "Resource Types".to_string(),
        TARGET_AUDIENCES => "Target Audiences".to_string(),
        other => other
            .split(['-', '_'])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().collect::<String>() + chars.as_str()
                })
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Taxonomies shown as filters and columns: the built-ins followed by any
/// additional ones from settings.
#[must_use]
pub fn listing_taxonomies(settings: &LibrarySettings) -> Vec<String> {
    let mut all: Vec<String> = BUILTIN.iter().map(ToString::to_string).collect();
    for extra in &settings.additional_taxonomies {
        if !all.contains(extra) {
            all.push(extra.clone());
        }
    }
    all
}

const TERM_COLUMNS: &str = "id, taxonomy, name, slug, parent, featured_image";

/// Term store.
#[derive(Debug, Clone)]
pub struct Taxonomies {
    db: Database,
}

impl Taxonomies {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Finds a term by slug or by exact name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn term_exists(&self, name_or_slug: &str, taxonomy: &str) -> Result<Option<Term>> {
        let term = sqlx::query_as::<_, Term>(&format!(
            "SELECT {TERM_COLUMNS} FROM terms
             WHERE taxonomy = ?1 AND (slug = ?2 OR name = ?3)
             ORDER BY slug = ?2 DESC
             LIMIT 1"
        ))
        .bind(taxonomy)
        .bind(sanitize_title(name_or_slug))
        .bind(name_or_slug.trim())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(term)
    }

    /// Fetches a term by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get_term(&self, id: i64) -> Result<Option<Term>> {
        let term = sqlx::query_as::<_, Term>(&format!("SELECT {TERM_COLUMNS} FROM terms WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(term)
    }

    /// Creates a term. The slug is derived from the name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a blank name,
    /// [`StoreError::TermNotFound`] for an unknown parent, and a constraint
    /// violation when the slug already exists in the taxonomy.
    #[instrument(skip(self))]
    pub async fn insert_term(&self, name: &str, taxonomy: &str, parent: Option<i64>) -> Result<Term> {
        let name = name.trim();
        let slug = sanitize_title(name);
        if slug.is_empty() {
            return Err(StoreError::invalid("term name", name, "must contain letters or digits"));
        }
        let parent = parent.unwrap_or(0);
        if parent != 0 {
            match self.get_term(parent).await? {
                Some(parent_term) if parent_term.taxonomy == taxonomy => {}
                _ => return Err(StoreError::TermNotFound(parent.to_string())),
            }
        }

        let term = sqlx::query_as::<_, Term>(&format!(
            "INSERT INTO terms (taxonomy, name, slug, parent) VALUES (?, ?, ?, ?)
             RETURNING {TERM_COLUMNS}"
        ))
        .bind(taxonomy)
        .bind(name)
        .bind(&slug)
        .bind(parent)
        .fetch_one(self.db.pool())
        .await?;
        debug!(id = term.id, slug = %term.slug, "term created");
        Ok(term)
    }

    /// Returns the existing term or creates a top-level one.
    ///
    /// # Errors
    ///
    /// See [`Taxonomies::insert_term`].
    pub async fn ensure_term(&self, name: &str, taxonomy: &str) -> Result<Term> {
        if let Some(term) = self.term_exists(name, taxonomy).await? {
            return Ok(term);
        }
        self.insert_term(name, taxonomy, None).await
    }

    /// All terms of a taxonomy, parents before children, then by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn terms(&self, taxonomy: &str) -> Result<Vec<Term>> {
        let terms = sqlx::query_as::<_, Term>(&format!(
            "SELECT {TERM_COLUMNS} FROM terms WHERE taxonomy = ? ORDER BY parent <> 0, name"
        ))
        .bind(taxonomy)
        .fetch_all(self.db.pool())
        .await?;
        Ok(terms)
    }

    /// Stores the featured image URL of a term. Only `https://` URLs are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for other URLs and
    /// [`StoreError::TermNotFound`] for unknown ids.
    pub async fn set_featured_image(&self, term_id: i64, image_url: &str) -> Result<()> {
        let image_url = image_url.trim();
        let image = if image_url.is_empty() {
            None
        } else if image_url.starts_with("https://") && url::Url::parse(image_url).is_ok() {
            Some(image_url)
        } else {
            return Err(StoreError::invalid("featured image", image_url, "must start with https://"));
        };

        let result = sqlx::query("UPDATE terms SET featured_image = ? WHERE id = ?")
            .bind(image)
            .bind(term_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::TermNotFound(term_id.to_string()));
        }
        Ok(())
    }

    /// Attaches a term to a file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn add_file_term(&self, file_id: i64, term_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO file_terms (file_id, term_id) VALUES (?, ?)")
            .bind(file_id)
            .bind(term_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Replaces a file's terms in one taxonomy, creating missing terms by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any statement fails.
    #[instrument(skip(self, names))]
    pub async fn set_file_terms(&self, file_id: i64, taxonomy: &str, names: &[String]) -> Result<Vec<Term>> {
        let mut terms = Vec::with_capacity(names.len());
        for name in names {
            terms.push(self.ensure_term(name, taxonomy).await?);
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query(
            "DELETE FROM file_terms
             WHERE file_id = ? AND term_id IN (SELECT id FROM terms WHERE taxonomy = ?)",
        )
        .bind(file_id)
        .bind(taxonomy)
        .execute(&mut *tx)
        .await?;
        for term in &terms {
            sqlx::query("INSERT OR IGNORE INTO file_terms (file_id, term_id) VALUES (?, ?)")
                .bind(file_id)
                .bind(term.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(terms)
    }

    /// Terms attached to a file in one taxonomy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn file_terms(&self, file_id: i64, taxonomy: &str) -> Result<Vec<Term>> {
        let terms = sqlx::query_as::<_, Term>(
            "SELECT t.id, t.taxonomy, t.name, t.slug, t.parent, t.featured_image
             FROM terms t
             JOIN file_terms ft ON ft.term_id = t.id
             WHERE ft.file_id = ? AND t.taxonomy = ?
             ORDER BY t.parent <> 0, t.name",
        )
        .bind(file_id)
        .bind(taxonomy)
        .fetch_all(self.db.pool())
        .await?;
        Ok(terms)
    }

    /// Detaches every term from a file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    pub async fn clear_file_terms(&self, file_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM file_terms WHERE file_id = ?")
            .bind(file_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// File ids carrying any of the given `taxonomy => slug` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn file_ids_by_terms(&self, filters: &BTreeMap<String, String>) -> Result<Vec<i64>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let pairs: Vec<(&str, &str)> = filters
            .iter()
            .map(|(taxonomy, slug)| (taxonomy.as_str(), slug.as_str()))
            .collect();
        let pairs_json = serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string());

        let rows: Vec<(i64,)> = sqlx::query_as(
            r"SELECT DISTINCT ft.file_id
              FROM file_terms ft
              JOIN terms t ON t.id = ft.term_id
              JOIN json_each(?1) pair
                ON t.taxonomy = json_extract(pair.value, '$[0]')
               AND t.slug = json_extract(pair.value, '$[1]')
              ORDER BY ft.file_id",
        )
        .bind(pairs_json)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}
