//! Download report and the per-file count export.
//!
//! The report is five ranked tables built from the download log. The export
//! walks every logged file, most downloaded first, in chunks so a large log
//! never has to be held in memory at once.

use std::collections::HashMap;
use std::io::Write;
use std::pin::pin;

use futures_util::{StreamExt, stream};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::downloads::{DownloadLog, FileDownloads, TermDownloads, UserDownloads};
use crate::error::StoreError;
use crate::files::Files;
use crate::helpers::escape_html;
use crate::taxonomy::{FORMATS, RESOURCE_TYPES, TARGET_AUDIENCES};
use crate::users::Requester;

/// File ids per count query during export.
pub const EXPORT_CHUNK_SIZE: usize = 10_000;

/// Column headers of the count export.
pub const EXPORT_HEADER: [&str; 3] = ["File ID", "File Title", "Downloads"];

/// Report and export failures.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("You do not have permission to export download counts.")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Ranked rows of one report table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum ReportRows {
    Files(Vec<FileDownloads>),
    Terms(Vec<TermDownloads>),
    Users(Vec<UserDownloads>),
}

impl ReportRows {
    /// Headers of the id and name columns.
    #[must_use]
    pub fn headers(&self) -> (&'static str, &'static str) {
        match self {
            Self::Files(_) => ("File ID", "Title"),
            Self::Terms(_) => ("Term ID", "Term Name"),
            Self::Users(_) => ("User ID", "Display Name"),
        }
    }

    /// `(id, name, downloads)` per row.
    #[must_use]
    pub fn cells(&self) -> Vec<(i64, &str, i64)> {
        match self {
            Self::Files(rows) => rows
                .iter()
                .map(|r| (r.file_id, r.title.as_str(), r.downloads))
                .collect(),
            Self::Terms(rows) => rows
                .iter()
                .map(|r| (r.term_id, r.term_name.as_str(), r.downloads))
                .collect(),
            Self::Users(rows) => rows
                .iter()
                .map(|r| (r.user_id, r.display_name.as_str(), r.downloads))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Files(rows) => rows.is_empty(),
            Self::Terms(rows) => rows.is_empty(),
            Self::Users(rows) => rows.is_empty(),
        }
    }
}

/// One titled report table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub rows: ReportRows,
}

impl ReportSection {
    fn new(title: &str, rows: ReportRows) -> Self {
        Self {
            title: title.to_string(),
            rows,
        }
    }

    /// The section as a `widefat` table.
    #[must_use]
    pub fn render_html(&self) -> String {
        let (id_header, name_header) = self.rows.headers();
        let mut out = format!(
            "<div class=\"report-section\"><h2>{}</h2><table class=\"widefat\"><thead><tr>\
             <th class=\"id\">{id_header}</th><th class=\"item\">{name_header}</th>\
             <th class=\"count\">Number of Downloads</th></tr></thead><tbody>",
            escape_html(&self.title)
        );
        for (id, name, downloads) in self.rows.cells() {
            out.push_str(&format!(
                "<tr><td>{id}</td><td>{}</td><td>{downloads}</td></tr>",
                escape_html(name)
            ));
        }
        out.push_str("</tbody></table></div>");
        out
    }

    /// Plain text table for terminals.
    #[must_use]
    pub fn render_text(&self) -> String {
        let (id_header, name_header) = self.rows.headers();
        let mut out = format!("{}\n{id_header:>8}  {name_header:<40}  Downloads\n", self.title);
        if self.rows.is_empty() {
            out.push_str("  (none)\n");
        }
        for (id, name, downloads) in self.rows.cells() {
            out.push_str(&format!("{id:>8}  {name:<40}  {downloads}\n"));
        }
        out
    }
}

/// Report builder and exporter.
#[derive(Debug, Clone)]
pub struct Report {
    log: DownloadLog,
    files: Files,
}

impl Report {
    #[must_use]
    pub fn new(log: DownloadLog, files: Files) -> Self {
        Self { log, files }
    }

    /// The five report tables, `qty` rows each (0 for the default).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Store`] if a query fails.
    #[instrument(skip(self))]
    pub async fn sections(&self, qty: u32) -> Result<Vec<ReportSection>, ReportError> {
        Ok(vec![
            ReportSection::new("Top Downloads", ReportRows::Files(self.log.top_downloads(qty).await?)),
            ReportSection::new(
                "Top Formats Downloaded",
                ReportRows::Terms(self.log.top_downloads_by_taxonomy(FORMATS, qty).await?),
            ),
            ReportSection::new(
                "Top Resource Types Downloaded",
                ReportRows::Terms(self.log.top_downloads_by_taxonomy(RESOURCE_TYPES, qty).await?),
            ),
            ReportSection::new(
                "Top Target Audiences Downloaded",
                ReportRows::Terms(self.log.top_downloads_by_taxonomy(TARGET_AUDIENCES, qty).await?),
            ),
            ReportSection::new(
                "Top Users Downloading Files",
                ReportRows::Users(self.log.top_users(qty).await?),
            ),
        ])
    }

    /// The whole report page body.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Store`] if a query fails.
    pub async fn render_html(&self, qty: u32) -> Result<String, ReportError> {
        let sections = self.sections(qty).await?;
        let body: String = sections.iter().map(ReportSection::render_html).collect();
        Ok(format!(
            "<div class=\"wrap\"><h1>File Library Report</h1><p>Insights on downloads.</p><div id=\"erifl-report\">{body}</div></div>"
        ))
    }

    /// Writes `File ID,File Title,Downloads` rows for every logged file,
    /// most downloaded first, flushing after each chunk. Returns the number
    /// of data rows written. A failure part way leaves the rows written so
    /// far in `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Forbidden`] unless `requester` is an
    /// administrator, or a store or write error.
    #[instrument(skip(self, requester, out), fields(user_id = requester.user_id))]
    pub async fn export_counts_csv<W: Write>(&self, requester: &Requester, out: W) -> Result<u64, ReportError> {
        if !requester.is_admin() {
            return Err(ReportError::Forbidden);
        }

        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(EXPORT_HEADER)?;

        let ids = self.log.sorted_file_ids().await?;
        let mut chunks = pin!(stream::iter(ids.chunks(EXPORT_CHUNK_SIZE)).then(|chunk| self.chunk_rows(chunk)));

        let mut written = 0u64;
        while let Some(rows) = chunks.next().await {
            for (file_id, title, count) in rows? {
                writer.write_record([file_id.to_string(), title, count.to_string()])?;
                written += 1;
            }
            writer.flush()?;
        }

        info!(rows = written, "download counts exported");
        Ok(written)
    }

    async fn chunk_rows(&self, chunk: &[i64]) -> Result<Vec<(i64, String, i64)>, ReportError> {
        let counts = self.log.download_counts(chunk).await?;
        let titles: HashMap<i64, String> = self
            .files
            .get_many(chunk)
            .await?
            .into_iter()
            .map(|file| (file.id, file.title))
            .collect();
        Ok(counts
            .into_iter()
            .map(|c| {
                let title = titles.get(&c.file_id).cloned().unwrap_or_default();
                (c.file_id, title, c.count)
            })
            .collect())
    }
}

/// `{domain}_download_counts.csv`, where domain is the site host without
/// its last extension.
#[must_use]
pub fn export_filename(site_url: &str) -> String {
    let host = Url::parse(site_url)
        .ok()
        .and_then(|url| url.host_str().map(ToString::to_string))
        .unwrap_or_default();
    let domain = match host.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => host,
    };
    format!("{domain}_download_counts.csv")
}
