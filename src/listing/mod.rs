//! Admin view of the download log: query-string filters, paging and rows.
//!
//! Rows are fetched newest first and paged in memory, the same way the log
//! table is browsed from the dashboard.

mod pagination;

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, instrument};

pub use pagination::{PER_PAGE_CHOICES, Pagination, per_page_choices};

use crate::downloads::{DownloadLog, DownloadOrder, DownloadQuery, DownloadRecord, TIME_FORMAT};
use crate::error::Result;
use crate::files::Files;
use crate::helpers::{escape_html, sanitize_key};
use crate::hooks::Hooks;
use crate::settings::LibrarySettings;
use crate::taxonomy::{FORMATS, Term, listing_taxonomies, taxonomy_label};
use crate::users::{GUEST_USER_ID, Users};

/// Display layout of the date column.
pub const DATE_FORMAT: &str = "%B %-d, %Y at %-I:%M %p";

/// Filters and paging read from the view's query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadLogFilters {
    pub user_id: Option<i64>,
    pub user_ip: Option<String>,
    pub file_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `taxonomy => slug`.
    pub taxonomies: BTreeMap<String, String>,
    /// Requested page size; `None` keeps the stored one.
    pub per_page: Option<u32>,
    /// 1-based.
    pub paged: u64,
}

impl DownloadLogFilters {
    /// Reads `user`, `file`, `start_date`, `end_date`, `per_page`, `paged` and
    /// one key per listing taxonomy.
    ///
    /// `user` may be an address, a numeric id, an email or a login; a value
    /// that resolves to nobody adds no user filter. Unparseable dates and
    /// numbers are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a user lookup fails.
    pub async fn from_query(
        params: &BTreeMap<String, String>,
        users: &Users,
        settings: &LibrarySettings,
    ) -> Result<Self> {
        let value = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let mut filters = Self {
            paged: 1,
            ..Self::default()
        };

        if let Some(user) = value("user") {
            if user.parse::<IpAddr>().is_ok() {
                filters.user_ip = Some(user.to_string());
            } else if let Ok(id) = user.parse::<i64>() {
                filters.user_id = Some(id.saturating_abs());
            } else if let Some(found) = users.find_by_email(user).await? {
                filters.user_id = Some(found.id);
            } else if let Some(found) = users.find_by_login(user).await? {
                filters.user_id = Some(found.id);
            } else {
                debug!(user, "user filter matched nobody");
            }
        }

        filters.file_id = value("file")
            .and_then(|v| v.parse::<i64>().ok())
            .map(i64::saturating_abs)
            .filter(|id| *id > 0);
        filters.start_date = value("start_date").and_then(parse_date);
        filters.end_date = value("end_date").and_then(parse_date);
        filters.per_page = value("per_page")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0);
        filters.paged = value("paged")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1)
            .max(1);

        for taxonomy in listing_taxonomies(settings) {
            if let Some(slug) = value(&taxonomy).map(sanitize_key)
                && !slug.is_empty()
            {
                filters.taxonomies.insert(taxonomy, slug);
            }
        }

        Ok(filters)
    }

    /// The log query these filters describe, newest first.
    #[must_use]
    pub fn to_query(&self) -> DownloadQuery {
        DownloadQuery {
            user_id: self.user_id,
            user_ip: self.user_ip.clone(),
            file_id: self.file_id,
            taxonomies: self.taxonomies.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            order_by: Some(DownloadOrder::Time),
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Taxonomies shown as columns. Formats are filterable but not a column.
#[must_use]
pub fn column_taxonomies(settings: &LibrarySettings) -> Vec<String> {
    listing_taxonomies(settings)
        .into_iter()
        .filter(|taxonomy| taxonomy != FORMATS)
        .collect()
}

/// Who downloaded, as shown in the user column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UserCell {
    /// Guest with a recorded address and its lookup link.
    Guest { ip: String, lookup_url: String },
    Member { id: i64, display_name: String },
    /// Guest without an address.
    GuestNoIp,
    /// Registered id with no user behind it anymore.
    Unknown(i64),
}

impl UserCell {
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Guest { ip, .. } => format!("Guest ({ip})"),
            Self::Member { id, display_name } => format!("{display_name} (ID: {id})"),
            Self::GuestNoIp => "Guest (No IP Found)".to_string(),
            Self::Unknown(id) => format!("Unknown User ID: {id}"),
        }
    }

    #[must_use]
    pub fn to_html(&self) -> String {
        match self {
            Self::Guest { ip, lookup_url } => format!(
                "Guest (<a href=\"{}\" target=\"_blank\">{}</a>)",
                escape_html(lookup_url),
                escape_html(ip)
            ),
            other => escape_html(&other.to_text()),
        }
    }
}

/// A top-level term and the child terms attached next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermFamily {
    /// `None` when only children of an unattached parent are present.
    pub parent: Option<Term>,
    pub children: Vec<Term>,
}

/// One taxonomy cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCell {
    pub taxonomy: String,
    pub families: Vec<TermFamily>,
}

impl TermCell {
    /// Groups terms under their parents, keeping first-seen order.
    #[must_use]
    pub fn new(taxonomy: &str, terms: Vec<Term>) -> Self {
        let mut families: Vec<(i64, TermFamily)> = Vec::new();
        for term in terms {
            let key = if term.is_top_level() { term.id } else { term.parent };
            let index = match families.iter().position(|(id, _)| *id == key) {
                Some(index) => index,
                None => {
                    families.push((
                        key,
                        TermFamily {
                            parent: None,
                            children: Vec::new(),
                        },
                    ));
                    families.len() - 1
                }
            };
            let family = &mut families[index].1;
            if term.is_top_level() {
                family.parent = Some(term);
            } else {
                family.children.push(term);
            }
        }
        Self {
            taxonomy: taxonomy.to_string(),
            families: families.into_iter().map(|(_, family)| family).collect(),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        if self.families.is_empty() {
            return "--".to_string();
        }
        self.families
            .iter()
            .map(|family| {
                let children: Vec<&str> = family.children.iter().map(|t| t.name.as_str()).collect();
                match (&family.parent, children.is_empty()) {
                    (Some(parent), true) => parent.name.clone(),
                    (Some(parent), false) => format!("{} ({})", parent.name, children.join(", ")),
                    (None, _) => children.join(", "),
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parents in bold with children in parentheses below them.
    #[must_use]
    pub fn to_html(&self, filter_url: impl Fn(&Term) -> String) -> String {
        if self.families.is_empty() {
            return "--".to_string();
        }
        let link = |term: &Term, weight: &str| {
            format!(
                "<a href=\"{}\" style=\"font-weight: {weight}\">{}</a>",
                escape_html(&filter_url(term)),
                escape_html(&term.name)
            )
        };

        let mut out = String::new();
        for family in &self.families {
            if let Some(parent) = &family.parent {
                out.push_str(&link(parent, "bold"));
            }
            if !family.children.is_empty() {
                let children: Vec<String> = family.children.iter().map(|t| link(t, "normal")).collect();
                out.push_str(&format!("<br>(<em>{}</em>)<br><br>", children.join(", ")));
            }
        }
        out
    }
}

/// One rendered log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLogRow {
    pub record: DownloadRecord,
    /// Formatted date, or the raw value when it does not parse.
    pub date: String,
    /// `None` when the file no longer exists.
    pub file_title: Option<String>,
    pub user: UserCell,
    pub terms: Vec<TermCell>,
}

impl DownloadLogRow {
    #[must_use]
    pub fn title_text(&self) -> String {
        self.file_title
            .clone()
            .unwrap_or_else(|| format!("Unknown File ID: {}", self.record.file_id))
    }
}

/// Formats a stored log time for display.
#[must_use]
pub fn format_log_time(time: &str) -> String {
    NaiveDateTime::parse_from_str(time, TIME_FORMAT)
        .map_or_else(|_| time.to_string(), |t| t.format(DATE_FORMAT).to_string())
}

/// One page of the log view.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadLogPage {
    /// `(key, label)` pairs, in display order.
    pub columns: Vec<(String, String)>,
    pub rows: Vec<DownloadLogRow>,
    pub pagination: Pagination,
    pub per_page_choices: Vec<u32>,
}

impl DownloadLogPage {
    /// Table markup with a filter link per term.
    #[must_use]
    pub fn render_html(&self) -> String {
        let mut out = String::from("<table class=\"wp-list-table widefat fixed striped\"><thead><tr>");
        for (key, label) in &self.columns {
            out.push_str(&format!(
                "<th class=\"column-{}\">{}</th>",
                escape_html(key),
                escape_html(label)
            ));
        }
        out.push_str("</tr></thead><tbody>");

        if self.rows.is_empty() {
            out.push_str(&format!(
                "<tr class=\"no-items\"><td colspan=\"{}\">No downloads found.</td></tr>",
                self.columns.len()
            ));
        }
        for row in &self.rows {
            let title = match &row.file_title {
                Some(title) => format!(
                    "<a href=\"?file={}\">{}</a>",
                    row.record.file_id,
                    escape_html(title)
                ),
                None => escape_html(&row.title_text()),
            };
            out.push_str(&format!(
                "<tr><td>{}</td><td>{title}</td><td>{}</td>",
                escape_html(&row.date),
                row.user.to_html()
            ));
            for cell in &row.terms {
                let html = cell.to_html(|term| {
                    format!("?{}={}", cell.taxonomy, urlencoding::encode(&term.slug))
                });
                out.push_str(&format!("<td>{html}</td>"));
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");

        let items = self.pagination.total;
        out.push_str(&format!(
            "<div class=\"tablenav\"><span class=\"displaying-num\">{items} item{}</span> \
             <span class=\"paging-input\">{} of {}</span></div>",
            if items == 1 { "" } else { "s" },
            self.pagination.page,
            self.pagination.total_pages.max(1)
        ));
        out
    }
}

/// Builds log pages from the store.
#[derive(Debug, Clone)]
pub struct DownloadLogView {
    log: DownloadLog,
    files: Files,
}

impl DownloadLogView {
    #[must_use]
    pub fn new(log: DownloadLog, files: Files) -> Self {
        Self { log, files }
    }

    /// Reads filters from a query string map and builds the page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a query fails.
    pub async fn page_from_query(&self, params: &BTreeMap<String, String>) -> Result<DownloadLogPage> {
        let settings = self.files.settings().load().await?;
        let filters = DownloadLogFilters::from_query(params, self.files.users(), &settings).await?;
        self.page(&filters).await
    }

    /// One page of filtered rows. A requested page size is remembered for
    /// the next visit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a query fails.
    #[instrument(skip(self))]
    pub async fn page(&self, filters: &DownloadLogFilters) -> Result<DownloadLogPage> {
        let settings_store = self.files.settings();
        if let Some(per_page) = filters.per_page {
            settings_store.set_per_page(per_page).await?;
        }
        let settings = settings_store.load().await?;
        let per_page = filters.per_page.unwrap_or(settings.per_page);

        let records = self.log.get(&filters.to_query()).await?;
        let pagination = Pagination::new(records.len() as u64, per_page, filters.paged);
        let taxonomies = column_taxonomies(&settings);

        let mut columns = vec![
            ("date".to_string(), "Date".to_string()),
            ("title".to_string(), "File".to_string()),
            ("user".to_string(), "User".to_string()),
        ];
        columns.extend(
            taxonomies
                .iter()
                .map(|taxonomy| (taxonomy.clone(), taxonomy_label(taxonomy))),
        );

        let hooks = self.files.hooks();
        let mut rows = Vec::new();
        for record in pagination.slice(&records) {
            rows.push(self.row(record.clone(), &taxonomies, hooks).await?);
        }

        Ok(DownloadLogPage {
            columns,
            rows,
            pagination,
            per_page_choices: per_page_choices(per_page),
        })
    }

    async fn row(&self, record: DownloadRecord, taxonomies: &[String], hooks: &Hooks) -> Result<DownloadLogRow> {
        let file_title = self.files.get(record.file_id).await?.map(|file| file.title);

        let user = match record.user_ip.as_deref() {
            Some(ip) if !ip.is_empty() => UserCell::Guest {
                ip: ip.to_string(),
                lookup_url: hooks.ip_lookup_url(ip),
            },
            _ => match self.files.users().get(record.user_id).await? {
                Some(user) => UserCell::Member {
                    id: user.id,
                    display_name: user.display_name,
                },
                None if record.user_id == GUEST_USER_ID => UserCell::GuestNoIp,
                None => UserCell::Unknown(record.user_id),
            },
        };

        let mut terms = Vec::with_capacity(taxonomies.len());
        for taxonomy in taxonomies {
            let attached = self.files.taxonomies().file_terms(record.file_id, taxonomy).await?;
            terms.push(TermCell::new(taxonomy, attached));
        }

        Ok(DownloadLogRow {
            date: format_log_time(&record.time),
            file_title,
            user,
            terms,
            record,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::cache::CacheStore;
    use crate::db::Database;
    use crate::files::NewFile;
    use crate::settings::keys;
    use crate::taxonomy::RESOURCE_TYPES;
    use crate::users::NewUser;

    struct Setup {
        _tmp: TempDir,
        view: DownloadLogView,
        files: Files,
        log: DownloadLog,
    }

    async fn setup() -> Setup {
        let tmp = TempDir::new().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let cache = Arc::new(CacheStore::default());
        let log = DownloadLog::new(db.clone(), cache.clone(), "");
        log.ensure_table().await.unwrap();
        let files = Files::new(
            db,
            cache,
            Arc::new(log.clone()),
            Arc::new(Hooks::new()),
            tmp.path().to_path_buf(),
            "https://example.com/uploads".to_string(),
        );
        Setup {
            _tmp: tmp,
            view: DownloadLogView::new(log.clone(), files.clone()),
            files,
            log,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn term(id: i64, name: &str, parent: i64) -> Term {
        Term {
            id,
            taxonomy: RESOURCE_TYPES.to_string(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            parent,
            featured_image: None,
        }
    }

    #[test]
    fn test_format_log_time() {
        assert_eq!(format_log_time("2024-10-15 15:04:00"), "October 15, 2024 at 3:04 PM");
        assert_eq!(format_log_time("garbage"), "garbage");
    }

    #[test]
    fn test_term_cell_groups_children_under_parent() {
        let cell = TermCell::new(
            RESOURCE_TYPES,
            vec![term(1, "Guides", 0), term(2, "Quick", 1), term(3, "Long", 1)],
        );
        assert_eq!(cell.to_text(), "Guides (Quick, Long)");
        let html = cell.to_html(|t| format!("?r={}", t.slug));
        assert!(html.starts_with("<a href=\"?r=guides\" style=\"font-weight: bold\">Guides</a>"));
        assert!(html.contains("<br>(<em><a href=\"?r=quick\" style=\"font-weight: normal\">Quick</a>"));
        assert_eq!(TermCell::new(RESOURCE_TYPES, Vec::new()).to_text(), "--");
    }

    #[test]
    fn test_user_cell_labels() {
        let guest = UserCell::Guest {
            ip: "203.0.113.5".to_string(),
            lookup_url: "https://lookup/203.0.113.5".to_string(),
        };
        assert_eq!(
            guest.to_html(),
            "Guest (<a href=\"https://lookup/203.0.113.5\" target=\"_blank\">203.0.113.5</a>)"
        );
        assert_eq!(UserCell::GuestNoIp.to_text(), "Guest (No IP Found)");
        assert_eq!(UserCell::Unknown(8).to_text(), "Unknown User ID: 8");
    }

    #[tokio::test]
    async fn test_filters_resolve_user_forms() {
        let s = setup().await;
        let id = s
            .files
            .users()
            .create(&NewUser {
                login: "ada",
                email: "ada@example.com",
                display_name: "Ada",
                roles: &[],
            })
            .await
            .unwrap();
        let settings = LibrarySettings::default();
        let users = s.files.users();

        let by_ip = DownloadLogFilters::from_query(&params(&[("user", "203.0.113.5")]), users, &settings)
            .await
            .unwrap();
        assert_eq!(by_ip.user_ip.as_deref(), Some("203.0.113.5"));

        let by_email = DownloadLogFilters::from_query(&params(&[("user", "ada@example.com")]), users, &settings)
            .await
            .unwrap();
        assert_eq!(by_email.user_id, Some(id));

        let by_login = DownloadLogFilters::from_query(&params(&[("user", "ada")]), users, &settings)
            .await
            .unwrap();
        assert_eq!(by_login.user_id, Some(id));

        let nobody = DownloadLogFilters::from_query(
            &params(&[("user", "ghost"), ("paged", "0"), ("erifl-resource-types", "Guides!")]),
            users,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(nobody.user_id, None);
        assert_eq!(nobody.paged, 1);
        assert_eq!(nobody.taxonomies.get(RESOURCE_TYPES).map(String::as_str), Some("guides"));
    }

    #[tokio::test]
    async fn test_filters_saturate_most_negative_ids() {
        let s = setup().await;
        let settings = LibrarySettings::default();
        let filters = DownloadLogFilters::from_query(
            &params(&[("user", "-9223372036854775808"), ("file", "-9223372036854775808")]),
            s.files.users(),
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(filters.user_id, Some(i64::MAX));
        assert_eq!(filters.file_id, Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_page_beyond_last_shows_last_rows_and_persists_size() {
        let s = setup().await;
        let file = s
            .files
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();
        for day in 1..=7 {
            let time = NaiveDate::from_ymd_opt(2024, 10, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap();
            s.log.add_record_at(0, Some("203.0.113.5"), file.id, time).await.unwrap();
        }
        s.log.add_record(42, None, 999).await.unwrap();

        let page = s
            .view
            .page_from_query(&params(&[("file", &file.id.to_string()), ("per_page", "5"), ("paged", "9")]))
            .await
            .unwrap();
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[1].date, "October 1, 2024 at 12:00 PM");
        assert_eq!(page.rows[0].title_text(), "Guide");
        assert!(matches!(page.rows[0].user, UserCell::Guest { .. }));
        assert_eq!(page.per_page_choices, vec![5, 10, 25, 50]);
        assert_eq!(
            s.files.settings().get(keys::PER_PAGE).await.unwrap().as_deref(),
            Some("5")
        );

        let all = s.view.page(&DownloadLogFilters { paged: 1, ..DownloadLogFilters::default() }).await.unwrap();
        assert_eq!(all.pagination.per_page, 5);
        let orphan = all.rows.iter().find(|row| row.record.file_id == 999).unwrap();
        assert_eq!(orphan.title_text(), "Unknown File ID: 999");
        assert_eq!(orphan.user, UserCell::Unknown(42));
        assert!(all.render_html().contains("Unknown User ID: 42"));
        assert_eq!(all.columns.len(), 5);
    }
}
