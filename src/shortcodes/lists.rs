//! The list shortcodes: download history, top downloads and file lists.

use chrono::NaiveDateTime;
use url::Url;

use super::{FileAttrs, LIST_PAGE_PARAM, RenderContext, Shortcode, Shortcodes, absint, type_error};
use crate::downloads::TIME_FORMAT;
use crate::error::Result;
use crate::files::{FileListQuery, FileOrderBy, SortOrder};
use crate::helpers::{admin_error, escape_html, sanitize_key, sanitize_text_field, split_list};
use crate::listing::Pagination;
use crate::settings::LibrarySettings;
use crate::users::GUEST_USER_ID;

pub const USER_HISTORY_TAG: &str = "erifl_user_download_history";
pub const TOP_DOWNLOADS_TAG: &str = "erifl_top_downloads";
pub const FILE_LIST_TAG: &str = "erifl_file_list";

/// Accepted `type` values of the list shortcodes.
pub const LIST_TYPES: [&str; 5] = ["link", "button", "full", "post", "title"];

/// The sanitized `type`, or the admin notice to show instead.
fn list_type(shortcode: &Shortcode, ctx: &RenderContext) -> std::result::Result<String, String> {
    let render_type = sanitize_key(shortcode.attr("type", "link"));
    if LIST_TYPES.contains(&render_type.as_str()) {
        Ok(render_type)
    } else {
        Err(admin_error(&type_error(&LIST_TYPES), ctx.requester.is_admin(), false))
    }
}

/// Permalink with `erifl-page` set to `page`.
fn page_link(permalink: &str, page: u64) -> String {
    match Url::parse(permalink) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != LIST_PAGE_PARAM)
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(LIST_PAGE_PARAM, &page.to_string());
            url.to_string()
        }
        Err(_) => format!("?{LIST_PAGE_PARAM}={page}"),
    }
}

impl Shortcodes {
    /// Files the viewer (or `user_id`) downloaded, latest first. Renders
    /// nothing while tracking is off and for guests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    pub async fn user_download_history(
        &self,
        shortcode: &Shortcode,
        ctx: &RenderContext,
        settings: &LibrarySettings,
    ) -> Result<String> {
        if !settings.tracking {
            return Ok(String::new());
        }
        let render_type = match list_type(shortcode, ctx) {
            Ok(render_type) => render_type,
            Err(notice) => return Ok(notice),
        };
        let user_id = match absint(shortcode.attr("user_id", "")) {
            0 => ctx.requester.user_id,
            id => id,
        };
        if user_id == GUEST_USER_ID {
            return Ok(String::new());
        }

        let history = self.log.user_download_history(user_id, None, None).await?;
        if history.is_empty() {
            return Ok(String::new());
        }

        let mut out = format!(
            "<ul class=\"erifl-user-download-history type-{render_type}\" data-user=\"{user_id}\">"
        );
        for entry in history {
            let date = NaiveDateTime::parse_from_str(&entry.last_download_time, TIME_FORMAT).map_or_else(
                |_| entry.last_download_time.clone(),
                |time| time.format("%B %-d, %Y %-I:%M %p").to_string(),
            );
            let item = self
                .file(&FileAttrs::list_item(entry.file_id, &render_type), ctx, settings)
                .await?;
            out.push_str(&format!(
                "<li data-file-id=\"{}\" title=\"Last Downloaded: {}\">{item}</li>",
                entry.file_id,
                escape_html(&date)
            ));
        }
        out.push_str("</ul>");
        Ok(out)
    }

    /// Published files with the highest stored download counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    pub async fn top_downloads(
        &self,
        shortcode: &Shortcode,
        ctx: &RenderContext,
        settings: &LibrarySettings,
    ) -> Result<String> {
        let render_type = match list_type(shortcode, ctx) {
            Ok(render_type) => render_type,
            Err(notice) => return Ok(notice),
        };
        let qty = u32::try_from(absint(shortcode.attr("qty", "10"))).unwrap_or(u32::MAX);

        let top = self.log.top_file_counts(qty).await?;
        if top.is_empty() {
            return Ok(String::new());
        }

        let mut out = format!("<ul class=\"erifl-top-downloads type-{render_type}\">");
        for row in top {
            let item = self
                .file(&FileAttrs::list_item(row.file_id, &render_type), ctx, settings)
                .await?;
            let count = if render_type == "post" {
                String::new()
            } else {
                format!(
                    "<span class=\"erifl-downloads\">Downloads: <strong>{}</strong></span>",
                    row.downloads
                )
            };
            out.push_str(&format!(
                "<li data-file-id=\"{}\">{item}{count}</li>",
                row.file_id
            ));
        }
        out.push_str("</ul>");
        Ok(out)
    }

    /// A filtered, paged list of published files.
    ///
    /// A page past the end shows the last page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    pub async fn file_list(
        &self,
        shortcode: &Shortcode,
        ctx: &RenderContext,
        settings: &LibrarySettings,
    ) -> Result<String> {
        let render_type = match list_type(shortcode, ctx) {
            Ok(render_type) => render_type,
            Err(notice) => return Ok(notice),
        };
        let list = |name: &str| split_list(&sanitize_text_field(shortcode.attr(name, "")));

        let per_page = u32::try_from(absint(shortcode.attr("per_page", "10"))).unwrap_or(u32::MAX);
        let unique_id = sanitize_key(shortcode.attr("unique_id", ""));
        let mut query = FileListQuery {
            file_ids: list("file_ids")
                .iter()
                .map(|id| absint(id))
                .filter(|id| *id > 0)
                .collect(),
            resource_types: list("resource_types"),
            target_audiences: list("target_audiences"),
            formats: list("formats"),
            required_roles: list("required_roles"),
            required_meta_keys: list("required_meta_keys"),
            order: SortOrder::parse(&sanitize_text_field(shortcode.attr("order", "ASC"))),
            order_by: FileOrderBy::parse(&sanitize_key(shortcode.attr("orderby", "title"))),
            per_page,
            offset: 0,
        };

        let mut page = ctx.list_page.max(1);
        query.offset = offset_for(page, per_page);
        let mut found = self.files.get_files(&query).await?;

        let total = u64::try_from(found.count).unwrap_or(0);
        if per_page > 0 && found.files.is_empty() && total > 0 {
            let last = Pagination::new(total, per_page, page).page;
            if last != page {
                page = last;
                query.offset = offset_for(page, per_page);
                found = self.files.get_files(&query).await?;
            }
        }
        if found.files.is_empty() {
            return Ok(String::new());
        }

        let id_attr = if unique_id.is_empty() {
            String::new()
        } else {
            format!(" id=\"{unique_id}\"")
        };
        let mut out = format!("<ul{id_attr} class=\"erifl-file-list type-{render_type}\">");
        for file in &found.files {
            let item = self
                .file(&FileAttrs::list_item(file.id, &render_type), ctx, settings)
                .await?;
            out.push_str(&format!("<li data-file-id=\"{}\">{item}</li>", file.id));
        }
        out.push_str("</ul>");

        if per_page > 0 && total > u64::from(per_page) {
            let pagination = Pagination::new(total, per_page, page);
            let mut nav = String::new();
            if pagination.has_previous() {
                nav.push_str(&format!(
                    "<a href=\"{}\" class=\"erifl-pagination-prev button\" data-id=\"{unique_id}\">&laquo; Previous</a>",
                    escape_html(&page_link(&ctx.permalink, page - 1))
                ));
            }
            nav.push_str(&format!(
                " <span class=\"erifl-pagination-current\">Page {page} of {}</span> ",
                pagination.total_pages
            ));
            if pagination.has_next() {
                nav.push_str(&format!(
                    "<a href=\"{}\" class=\"erifl-pagination-next button\" data-id=\"{unique_id}\">Next &raquo;</a>",
                    escape_html(&page_link(&ctx.permalink, page + 1))
                ));
            }
            out.push_str(&format!("<div class=\"erifl-pagination\">{nav}</div>"));
        }
        Ok(out)
    }
}

fn offset_for(page: u64, per_page: u32) -> u32 {
    u32::try_from((page - 1).saturating_mul(u64::from(per_page))).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::super::test_support::{admin, setup};
    use super::*;
    use crate::files::NewFile;
    use crate::settings::keys;
    use crate::users::Requester;

    fn sc(text: &str) -> Shortcode {
        super::super::parse_shortcodes(text).remove(0)
    }

    async fn settings(s: &super::super::test_support::Setup) -> LibrarySettings {
        s.files.settings().load().await.unwrap()
    }

    #[test]
    fn test_page_link_replaces_existing_param() {
        assert_eq!(
            page_link("https://example.com/library/?erifl-page=2&tab=a", 3),
            "https://example.com/library/?tab=a&erifl-page=3"
        );
        assert_eq!(page_link("", 2), "?erifl-page=2");
    }

    #[tokio::test]
    async fn test_file_list_pages_and_clamps() {
        let s = setup().await;
        for title in ["A", "B", "C"] {
            s.files
                .create(&NewFile {
                    title,
                    ..NewFile::default()
                })
                .await
                .unwrap();
        }
        let settings = settings(&s).await;
        let shortcode = sc(r#"[erifl_file_list type="title" per_page="2" unique_id="lib"]"#);

        let ctx = RenderContext {
            list_page: 1,
            permalink: "https://example.com/library/".to_string(),
            ..RenderContext::default()
        };
        let first = s.shortcodes.file_list(&shortcode, &ctx, &settings).await.unwrap();
        assert!(first.starts_with("<ul id=\"lib\" class=\"erifl-file-list type-title\">"));
        assert!(first.contains(">A</li>") && first.contains(">B</li>"));
        assert!(first.contains("Page 1 of 2"));
        assert!(first.contains("https://example.com/library/?erifl-page=2"));
        assert!(!first.contains("Previous"));

        let beyond = RenderContext {
            list_page: 7,
            ..ctx
        };
        let last = s.shortcodes.file_list(&shortcode, &beyond, &settings).await.unwrap();
        assert!(last.contains(">C</li>"));
        assert!(last.contains("Page 2 of 2"));
        assert!(last.contains("&laquo; Previous"));
        assert!(!last.contains("Next &raquo;"));
    }

    #[tokio::test]
    async fn test_top_downloads_lists_counts() {
        let s = setup().await;
        let file = s
            .files
            .create(&NewFile {
                title: "Popular",
                ..NewFile::default()
            })
            .await
            .unwrap();
        s.files.increment_download_count(file.id, 0).await.unwrap();
        s.files.increment_download_count(file.id, 0).await.unwrap();
        let settings = settings(&s).await;

        let html = s
            .shortcodes
            .top_downloads(&sc(r#"[erifl_top_downloads type="title"]"#), &RenderContext::default(), &settings)
            .await
            .unwrap();
        assert_eq!(
            html,
            format!(
                "<ul class=\"erifl-top-downloads type-title\"><li data-file-id=\"{}\">Popular<span class=\"erifl-downloads\">Downloads: <strong>2</strong></span></li></ul>",
                file.id
            )
        );

        let ctx = RenderContext {
            requester: admin(),
            ..RenderContext::default()
        };
        let bad = s
            .shortcodes
            .top_downloads(&sc(r#"[erifl_top_downloads type="count"]"#), &ctx, &settings)
            .await
            .unwrap();
        assert!(bad.contains("must be one of the following"));
    }

    #[tokio::test]
    async fn test_history_needs_tracking_and_a_user() {
        let s = setup().await;
        let file = s
            .files
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();
        let time = NaiveDate::from_ymd_opt(2024, 10, 15)
            .unwrap()
            .and_hms_opt(15, 4, 0)
            .unwrap();
        s.log.add_record_at(5, None, file.id, time).await.unwrap();
        let shortcode = sc(r#"[erifl_user_download_history type="title"]"#);

        let ctx = RenderContext {
            requester: Requester {
                user_id: 5,
                roles: Vec::new(),
                ip: None,
            },
            ..RenderContext::default()
        };
        let html = s
            .shortcodes
            .user_download_history(&shortcode, &ctx, &settings(&s).await)
            .await
            .unwrap();
        assert!(html.contains("title=\"Last Downloaded: October 15, 2024 3:04 PM\">Guide</li>"));

        let guest = s
            .shortcodes
            .user_download_history(&shortcode, &RenderContext::default(), &settings(&s).await)
            .await
            .unwrap();
        assert_eq!(guest, "");

        s.files.settings().set(keys::TRACKING, "0").await.unwrap();
        let off = s
            .shortcodes
            .user_download_history(&shortcode, &ctx, &settings(&s).await)
            .await
            .unwrap();
        assert_eq!(off, "");
    }
}
