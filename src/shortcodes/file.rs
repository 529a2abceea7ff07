//! `[erifl_file]`: one file in one layout.

use base64::Engine as _;
use base64::engine::general_purpose;
use chrono::NaiveDate;

use super::{RenderContext, Shortcode, Shortcodes, absint, type_error};
use crate::error::Result;
use crate::files::FileRecord;
use crate::helpers::{admin_error, escape_html, include_s, sanitize_key, sanitize_text_field, strip_tags};
use crate::settings::{IconType, LibrarySettings};
use crate::taxonomy::{FORMATS, RESOURCE_TYPES, listing_taxonomies};

/// Accepted `type` values of the single-file shortcode.
pub const FILE_TYPES: [&str; 9] = [
    "link",
    "button",
    "full",
    "post",
    "title",
    "description",
    "desc",
    "count",
    "icon",
];

/// Layout of a single-file render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderType {
    Link,
    Button,
    Full,
    Post,
    Title,
    Description,
    Desc,
    Count,
    Icon,
}

impl RenderType {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "link" => Some(Self::Link),
            "button" => Some(Self::Button),
            "full" => Some(Self::Full),
            "post" => Some(Self::Post),
            "title" => Some(Self::Title),
            "description" => Some(Self::Description),
            "desc" => Some(Self::Desc),
            "count" => Some(Self::Count),
            "icon" => Some(Self::Icon),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Button => "button",
            Self::Full => "full",
            Self::Post => "post",
            Self::Title => "title",
            Self::Description => "description",
            Self::Desc => "desc",
            Self::Count => "count",
            Self::Icon => "icon",
        }
    }

    fn shows_title(self) -> bool {
        matches!(
            self,
            Self::Full | Self::Link | Self::Button | Self::Post | Self::Title | Self::Icon
        )
    }

    fn shows_description(self) -> bool {
        matches!(self, Self::Full | Self::Post | Self::Desc | Self::Description)
    }

    fn shows_icon(self) -> bool {
        matches!(self, Self::Full | Self::Button | Self::Post | Self::Icon)
    }

    /// Layouts with a link, which also carry term classes.
    fn is_linked(self) -> bool {
        matches!(
            self,
            Self::Full | Self::Link | Self::Button | Self::Post | Self::Icon
        )
    }
}

/// Attributes of `[erifl_file]`, sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub id: i64,
    /// Page custom field holding the file id, used when `id` is absent.
    pub custom_field: String,
    pub render_type: String,
    /// Replaces the file title.
    pub title: String,
    /// Replaces the file description.
    pub desc: String,
    /// Added to the displayed download count.
    pub start_count: i64,
    /// Replaces the format list, comma or space separated.
    pub formats: String,
    pub classes: String,
    /// Base64 encoded fallback image URL for the post layout.
    pub default_img: String,
    /// Show the download count in the post layout.
    pub dlc: bool,
    pub ignore_pre_post: bool,
    /// Overrides the configured icon type.
    pub icon: Option<String>,
}

impl Default for FileAttrs {
    fn default() -> Self {
        Self {
            id: 0,
            custom_field: String::new(),
            render_type: "link".to_string(),
            title: String::new(),
            desc: String::new(),
            start_count: 0,
            formats: String::new(),
            classes: String::new(),
            default_img: String::new(),
            dlc: true,
            ignore_pre_post: false,
            icon: None,
        }
    }
}

impl FileAttrs {
    #[must_use]
    pub fn from_shortcode(shortcode: &Shortcode) -> Self {
        let text = |name: &str| sanitize_text_field(shortcode.attr(name, ""));
        Self {
            id: absint(shortcode.attr("id", "")),
            custom_field: text("custom_field"),
            render_type: sanitize_key(shortcode.attr("type", "link")),
            title: text("title"),
            desc: text("desc"),
            start_count: absint(shortcode.attr("start_count", "")),
            formats: text("formats"),
            classes: text("classes"),
            default_img: shortcode.attr("default_img", "").trim().to_string(),
            dlc: sanitize_key(shortcode.attr("dlc", "true")) == "true",
            ignore_pre_post: sanitize_key(shortcode.attr("ignore_pre_post", "false")) == "true",
            icon: shortcode.attrs.get("icon").map(|icon| sanitize_text_field(icon)),
        }
    }

    /// Attributes used by the list shortcodes for each item.
    #[must_use]
    pub fn list_item(id: i64, render_type: &str) -> Self {
        Self {
            id,
            render_type: render_type.to_string(),
            ignore_pre_post: true,
            ..Self::default()
        }
    }
}

fn background(url: &str) -> String {
    format!(" style=\"background-image: url({});\"", escape_html(url))
}

impl Shortcodes {
    /// Renders one file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::StoreError::Database) if a lookup fails.
    pub async fn file(&self, attrs: &FileAttrs, ctx: &RenderContext, settings: &LibrarySettings) -> Result<String> {
        let hooks = self.files.hooks();
        let is_admin = ctx.requester.is_admin();
        let hide_error = hooks.hide_error(&attrs.custom_field);

        let Some(render_type) = RenderType::parse(&attrs.render_type) else {
            return Ok(admin_error(&type_error(&FILE_TYPES), is_admin, hide_error));
        };

        let file_id = if attrs.id == 0 && !attrs.custom_field.is_empty() {
            ctx.page_meta
                .get(&attrs.custom_field)
                .map_or(0, |value| absint(value))
        } else {
            attrs.id
        };
        if file_id == 0 {
            return Ok(admin_error("FILE ID NOT FOUND", is_admin, hide_error));
        }

        let file = match self.files.get(file_id).await? {
            Some(file) if file.is_published() => file,
            other => {
                let status = other.map_or_else(|| "null".to_string(), |file| file.status_str);
                return Ok(admin_error(
                    &format!("<span status={status}>FILE NOT PUBLISHED</span>"),
                    is_admin,
                    hide_error,
                ));
            }
        };

        if !self
            .files
            .user_meets_requirements(file_id, ctx.requester.user_id)
            .await?
        {
            return Ok(settings.no_access_msg.clone());
        }

        let url = self.files.url_for(&file).await?.unwrap_or_default();
        let type_str = render_type.as_str();

        // Formats
        let mut formats: Vec<String> = Vec::new();
        let mut display_formats = String::new();
        if !settings.hide_format {
            if attrs.formats.is_empty() {
                formats = self
                    .files
                    .taxonomies()
                    .file_terms(file_id, FORMATS)
                    .await?
                    .into_iter()
                    .map(|term| term.name)
                    .collect();
                if !formats.is_empty() {
                    display_formats = format!("({})", escape_html(&formats.join("|")));
                }
            } else {
                formats = attrs
                    .formats
                    .to_lowercase()
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|format| !format.is_empty())
                    .map(ToString::to_string)
                    .collect();
                display_formats = format!("({})", escape_html(&attrs.formats));
            }
        }
        let display_formats = format!("<span class=\"erifl-formats\">{display_formats}</span>");

        let format_prefix = hooks
            .format_prefixes(&file, type_str)
            .into_iter()
            .rev()
            .find(|(format, _)| formats.contains(format))
            .map(|(_, prefix)| format!("{prefix} "))
            .unwrap_or_default();

        let mut title = String::new();
        if render_type.shows_title() {
            let (pre, post) = if attrs.ignore_pre_post {
                (String::new(), String::new())
            } else {
                (
                    format!(
                        "<span class=\"erifl-pre-text\">{} </span>",
                        escape_html(sanitize_text_field(&settings.pre_title).trim())
                    ),
                    format!(
                        "<span class=\"erifl-post-text\">{}</span>",
                        escape_html(sanitize_text_field(&settings.post_title).trim())
                    ),
                )
            };
            let main = if attrs.title.is_empty() {
                escape_html(&file.title)
            } else {
                escape_html(&attrs.title)
            };
            title = format!("{pre}{main}{post}");
            if render_type == RenderType::Icon {
                title = strip_tags(&title);
            }
        }

        let mut desc = String::new();
        if render_type.shows_description() {
            desc = if attrs.desc.is_empty() {
                escape_html(&sanitize_text_field(&file.description))
            } else {
                escape_html(&attrs.desc)
            };
        }

        let mut display_icon = String::new();
        if render_type.shows_icon() {
            let icon_type = attrs
                .icon
                .as_deref()
                .map_or_else(|| settings.icon_type.clone(), IconType::parse);
            let icon_title = (render_type == RenderType::Icon).then_some(title.as_str());
            let extension = file.extension();
            display_icon = hooks.icon(
                icon_type.render(icon_title, &self.assets_url),
                Some(&file),
                &extension,
            );
        }

        let count = file.download_count.saturating_add(attrs.start_count);
        let href = if settings.include_urls && !url.is_empty() {
            escape_html(&url)
        } else {
            "#".to_string()
        };

        let mut term_links = Vec::new();
        let mut term_classes = Vec::new();
        if render_type.is_linked() {
            for taxonomy in listing_taxonomies(settings) {
                if taxonomy == FORMATS {
                    continue;
                }
                for term in self.files.taxonomies().file_terms(file_id, &taxonomy).await? {
                    term_links.push(format!(
                        "<span class=\"{taxonomy} {}\">{}</span>",
                        term.slug,
                        escape_html(&term.name)
                    ));
                    term_classes.push(term.slug);
                }
            }
        }

        let classes = sanitize_text_field(&hooks.classes(attrs.classes.clone(), &file, type_str));
        let params = format!(
            "class=\"erifl-file {type_str} {} {} {}\" data-file=\"{file_id}\" data-type=\"{type_str}\" downloads=\"{count}\" rel=\"noopener noreferrer nofollow\"",
            escape_html(&formats.join(" ")),
            term_classes.join(" "),
            escape_html(&classes)
        );

        let output = match render_type {
            RenderType::Full => format!(
                "<div {params}><span class=\"erifl-icon\" style=\"margin-right: 5px;\">{display_icon}</span> {format_prefix}<a href=\"{href}\">{title}</a> {display_formats}<span class=\"erifl-desc\">{desc}</span></div>"
            ),
            RenderType::Link => format!(
                "<div {params}>{format_prefix}<a href=\"{href}\">{title}</a> {display_formats}</div>"
            ),
            RenderType::Button => format!(
                "<a href=\"{href}\" {params} style=\"text-decoration: none;\"><span class=\"erifl-icon\" style=\"margin-right: 5px;\">{display_icon}</span><span class=\"erifl-title\">{title} {display_formats} </span></a>"
            ),
            RenderType::Title => title,
            RenderType::Description | RenderType::Desc => desc,
            RenderType::Count => count.to_string(),
            RenderType::Icon => format!("<a href=\"{href}\" {params}>{display_icon}</a>"),
            RenderType::Post => {
                let mut display_icon = display_icon;
                let image = self.post_image(&file, attrs).await?;
                let bg_image = match image {
                    Some(url) => {
                        display_icon.clear();
                        background(&url)
                    }
                    None => String::new(),
                };

                let mut meta = vec![format!(
                    "<span class=\"erifl-date\">{}</span>",
                    created_label(&file)
                )];
                if attrs.dlc && count > 0 {
                    let label = format!("Downloaded {count} time{}", include_s(count));
                    let label = hooks.downloaded_count_label(label, count, &file);
                    meta.push(format!(
                        "<span class=\"erifl-count\">{}</span>",
                        escape_html(&sanitize_text_field(&label))
                    ));
                }
                meta.push(format!(
                    "<span class=\"erifl-tax-terms\">{}</span>",
                    term_links.join(", ")
                ));

                format!(
                    "<div {params}><a href=\"{href}\"><span class=\"erifl-image\"{bg_image}>{display_icon}</span></a><div class=\"erifl-content\"><div class=\"erifl-title\"><h4><a href=\"{href}\">{title}</a> - {display_formats}</h4></div><div class=\"erifl-meta\">{}</div><div class=\"erifl-desc\">{desc}</div></div></div>",
                    meta.join(" | ")
                )
            }
        };
        Ok(output)
    }

    /// Featured image, then the decoded `default_img`, then the first
    /// resource type image.
    async fn post_image(&self, file: &FileRecord, attrs: &FileAttrs) -> Result<Option<String>> {
        if let Some(image) = file.featured_image.as_deref().filter(|url| !url.is_empty()) {
            return Ok(Some(image.to_string()));
        }
        if !attrs.default_img.is_empty() {
            return Ok(general_purpose::STANDARD
                .decode(&attrs.default_img)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .filter(|url| !url.trim().is_empty()));
        }
        let image = self
            .files
            .taxonomies()
            .file_terms(file.id, RESOURCE_TYPES)
            .await?
            .into_iter()
            .find_map(|term| term.featured_image.filter(|url| !url.is_empty()));
        Ok(image)
    }
}

fn created_label(file: &FileRecord) -> String {
    NaiveDate::parse_from_str(file.created_date(), "%Y-%m-%d")
        .map_or_else(|_| file.created_date().to_string(), |date| date.format("%B %-d, %Y").to_string())
}
