//! Bracketed `[tag attr="value"]` directives inside page text.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A self-closing shortcode tag and its attributes.
#[allow(clippy::expect_used)]
static SHORTCODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([A-Za-z0-9_-]+)((?:\s+[A-Za-z0-9_-]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'\]]+))*)\s*/?\]"#)
        .expect("shortcode regex is valid") // Static pattern, safe to panic
});

/// One `name=value` pair; the value may be double, single or not quoted.
#[allow(clippy::expect_used)]
static ATTR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z0-9_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'\]]+))"#)
        .expect("attribute regex is valid") // Static pattern, safe to panic
});

/// A directive found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
    pub tag: String,
    /// Attribute names are lowercased.
    pub attrs: BTreeMap<String, String>,
    /// Byte range of the whole directive in the source text.
    pub span: Range<usize>,
}

impl Shortcode {
    /// Attribute value, or `default` when absent.
    #[must_use]
    pub fn attr<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attrs.get(name).map_or(default, String::as_str)
    }
}

/// Finds every directive in `text`, in order.
#[must_use]
pub fn parse_shortcodes(text: &str) -> Vec<Shortcode> {
    SHORTCODE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let tag = caps.get(1)?.as_str().to_string();
            let attrs = caps
                .get(2)
                .map(|raw| parse_attrs(raw.as_str()))
                .unwrap_or_default();
            Some(Shortcode {
                tag,
                attrs,
                span: whole.range(),
            })
        })
        .collect()
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    ATTR_PATTERN
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            Some((name, value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tags_and_quoted_attrs() {
        let text = r#"Intro [erifl_file id="12" type='button' dlc=false] and [erifl_top_downloads]."#;
        let found = parse_shortcodes(text);
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].tag, "erifl_file");
        assert_eq!(found[0].attr("id", ""), "12");
        assert_eq!(found[0].attr("type", "link"), "button");
        assert_eq!(found[0].attr("dlc", "true"), "false");
        assert_eq!(found[0].attr("title", "none"), "none");
        assert_eq!(&text[found[0].span.clone()], r#"[erifl_file id="12" type='button' dlc=false]"#);

        assert_eq!(found[1].tag, "erifl_top_downloads");
        assert!(found[1].attrs.is_empty());
    }

    #[test]
    fn test_uppercase_attr_names_are_lowercased() {
        let found = parse_shortcodes(r#"[erifl_file ID="3" Type="title" /]"#);
        assert_eq!(found[0].attr("id", ""), "3");
        assert_eq!(found[0].attr("type", ""), "title");
    }

    #[test]
    fn test_plain_brackets_are_not_attrs() {
        let found = parse_shortcodes("see [1] and [note: x]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag, "1");
    }
}
