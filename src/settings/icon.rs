//! Download icon styles.

use serde::{Deserialize, Serialize};

use crate::helpers::{escape_html, sanitize_key};

/// Icon shown by the `icon` shortcode type and next to full listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IconType {
    /// Bundled full logo image.
    LogoFull,
    /// Bundled file logo image.
    LogoFile,
    /// Font Awesome download glyph.
    Fa,
    /// Unicode inbox tray character.
    Uni,
    /// Cornerstone theme icon font.
    Cs,
    /// Any image URL.
    Custom(String),
}

impl IconType {
    /// Parses an option value. Unknown values without a file extension fall
    /// back to the full logo.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match sanitize_key(trimmed).as_str() {
            "logo-full" => Self::LogoFull,
            "logo-file" => Self::LogoFile,
            "fa" => Self::Fa,
            "uni" => Self::Uni,
            "cs" => Self::Cs,
            _ if has_extension(trimmed) => Self::Custom(trimmed.to_string()),
            _ => Self::LogoFull,
        }
    }

    /// Value persisted in the options table.
    #[must_use]
    pub fn as_option_value(&self) -> String {
        match self {
            Self::LogoFull => "logo-full".to_string(),
            Self::LogoFile => "logo-file".to_string(),
            Self::Fa => "fa".to_string(),
            Self::Uni => "uni".to_string(),
            Self::Cs => "cs".to_string(),
            Self::Custom(url) => url.clone(),
        }
    }

    /// Renders the icon markup.
    #[must_use]
    pub fn render(&self, title: Option<&str>, assets_url: &str) -> String {
        let title_attr = title.map_or_else(String::new, |title| {
            let title = escape_html(title);
            format!(" title=\"{title}\" aria-label=\"{title}\"")
        });
        let assets_url = assets_url.trim_end_matches('/');

        match self {
            Self::Custom(url) => format!(
                "<img class=\"erifl-icon custom\" src=\"{}\"{title_attr}>",
                escape_html(url)
            ),
            Self::LogoFile => format!(
                "<img class=\"erifl-icon logo-file\" src=\"{assets_url}/icon_file.png\"{title_attr}>"
            ),
            Self::Uni => format!("<span class=\"erifl-icon\"{title_attr}>&#x1F4E5;</span>"),
            Self::Fa => format!("<i class=\"erifl-icon fas fa-download\"{title_attr}></i>"),
            Self::Cs => format!(
                "<i aria-hidden=\"true\" class=\"erifl-icon x-icon\" data-x-icon-s=\"&#xf019;\"{title_attr}></i>"
            ),
            Self::LogoFull => format!(
                "<img class=\"erifl-icon logo-full\" src=\"{assets_url}/icon.png\"{title_attr}>"
            ),
        }
    }
}

fn has_extension(value: &str) -> bool {
    let last_segment = value.rsplit('/').next().unwrap_or(value);
    last_segment
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}
