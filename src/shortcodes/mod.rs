//! Public rendering of files through bracketed shortcodes.
//!
//! `[erifl_file]` renders one file in one of several layouts. The three list
//! shortcodes (`erifl_user_download_history`, `erifl_top_downloads` and
//! `erifl_file_list`) render a `<ul>` whose items are single-file renders.
//! Admin-only error notices stand in for broken directives; visitors just
//! see nothing.

mod file;
mod lists;
mod parser;

use std::collections::BTreeMap;

use tracing::{debug, instrument};

pub use file::{FILE_TYPES, FileAttrs, RenderType};
pub use lists::{FILE_LIST_TAG, LIST_TYPES, TOP_DOWNLOADS_TAG, USER_HISTORY_TAG};
pub use parser::{Shortcode, parse_shortcodes};

use crate::downloads::DownloadLog;
use crate::error::Result;
use crate::files::Files;
use crate::settings::LibrarySettings;
use crate::users::Requester;

/// Query parameter carrying the file list page number.
pub const LIST_PAGE_PARAM: &str = "erifl-page";

/// The page a shortcode is rendered on.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub requester: Requester,
    /// Custom fields of the page, looked up by `custom_field`.
    pub page_meta: BTreeMap<String, String>,
    /// Value of the `erifl-page` parameter; 0 and 1 both mean the first page.
    pub list_page: u64,
    /// URL of the page, used to build pagination links.
    pub permalink: String,
}

/// Shortcode renderer.
#[derive(Debug, Clone)]
pub struct Shortcodes {
    files: Files,
    log: DownloadLog,
    assets_url: String,
}

impl Shortcodes {
    #[must_use]
    pub fn new(files: Files, log: DownloadLog, assets_url: String) -> Self {
        Self {
            files,
            log,
            assets_url,
        }
    }

    /// Replaces every known shortcode in `text` with its output. Unknown
    /// tags are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    #[instrument(skip(self, text, ctx), fields(user_id = ctx.requester.user_id))]
    pub async fn render(&self, text: &str, ctx: &RenderContext) -> Result<String> {
        let settings = self.files.settings().load().await?;
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        for shortcode in parse_shortcodes(text) {
            let Some(rendered) = self.render_one(&shortcode, ctx, &settings).await? else {
                continue;
            };
            out.push_str(&text[cursor..shortcode.span.start]);
            out.push_str(&rendered);
            cursor = shortcode.span.end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    /// Output of one directive; `None` for tags this library does not own.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    pub async fn render_one(
        &self,
        shortcode: &Shortcode,
        ctx: &RenderContext,
        settings: &LibrarySettings,
    ) -> Result<Option<String>> {
        let tag = shortcode.tag.as_str();
        let output = if tag == settings.shortcode_tag() {
            self.file(&FileAttrs::from_shortcode(shortcode), ctx, settings).await?
        } else {
            match tag {
                USER_HISTORY_TAG => self.user_download_history(shortcode, ctx, settings).await?,
                TOP_DOWNLOADS_TAG => self.top_downloads(shortcode, ctx, settings).await?,
                FILE_LIST_TAG => self.file_list(shortcode, ctx, settings).await?,
                _ => return Ok(None),
            }
        };
        debug!(tag, "shortcode rendered");
        Ok(Some(output))
    }
}

/// Non-negative integer from an attribute; anything unparseable is 0.
fn absint(value: &str) -> i64 {
    value.trim().parse::<i64>().map_or(0, i64::saturating_abs)
}

/// Admin notice listing the accepted `type` values.
fn type_error(types: &[&str]) -> String {
    format!(
        "\"type\" shortcode parameter must be one of the following: <code>{}</code>",
        types.join("</code>, <code>")
    )
}
