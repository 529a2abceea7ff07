//! Small formatting and sanitizing helpers shared by the renderers.

/// Escapes text for HTML element content and attribute values.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Removes anything between `<` and `>`.
#[must_use]
pub fn strip_tags(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Single-line text input: tags stripped, whitespace runs collapsed, trimmed.
#[must_use]
pub fn sanitize_text_field(value: &str) -> String {
    strip_tags(value).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercases and keeps `[a-z0-9_-]`, like option and meta keys are stored.
#[must_use]
pub fn sanitize_key(value: &str) -> String {
    value
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect()
}

/// Turns a term name into a slug: lowercase, whitespace runs become `-`.
#[must_use]
pub fn sanitize_title(value: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in value.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            pending_dash = !slug.is_empty();
            continue;
        }
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '_' {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.push(lower);
        }
    }
    slug
}

/// Collapses unsafe filename characters into single underscores.
///
/// `report final.pdf` becomes `report_final.pdf`.
#[must_use]
pub fn sanitize_file_name(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

/// Boolean parsing with form-value truthiness: `1`, `true`, `on`, `yes`.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Splits a comma and/or whitespace separated list, dropping empty items.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Returns `"s"` unless `count` is exactly one.
#[must_use]
pub fn include_s(count: i64) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// Human readable byte size.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        1 => "1 byte".to_string(),
        b => format!("{b} bytes"),
    }
}

/// Weighted average of one to five star counts, rounded to two places.
///
/// `r1` is the number of one-star ratings, `r5` the number of five-star ratings.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn five_point_rating(r1: u64, r2: u64, r3: u64, r4: u64, r5: u64) -> f64 {
    let total = r1 + r2 + r3 + r4 + r5;
    if total == 0 {
        return 0.0;
    }
    let weighted = r1 + r2 * 2 + r3 * 3 + r4 * 4 + r5 * 5;
    ((weighted as f64 / total as f64) * 100.0).round() / 100.0
}

/// Inline error notice shown to administrators only.
///
/// Returns an empty string for everybody else, or when `hide` is set.
#[must_use]
pub fn admin_error(message: &str, viewer_is_admin: bool, hide: bool) -> String {
    if !viewer_is_admin || hide {
        return String::new();
    }
    format!(
        "<br><span class=\"erifl-error-notice\" style=\"background-color: red; color: white; padding: 10px 20px; border-radius: 5px; display: inline-block;\">ADMIN ERROR: {message}</span>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name_collapses_spaces() {
        assert_eq!(sanitize_file_name("report final.pdf"), "report_final.pdf");
        assert_eq!(sanitize_file_name("a  / b?.zip"), "a_b_.zip");
        assert_eq!(sanitize_file_name("  notes.txt"), "notes.txt");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Lesson Plans"), "lesson-plans");
        assert_eq!(sanitize_title("  PDF "), "pdf");
        assert_eq!(sanitize_title("K-12 / Teachers"), "k-12-teachers");
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("Member_Level!"), "member_level");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("no"));
    }

    #[test]
    fn test_split_list_mixed_separators() {
        assert_eq!(
            split_list("pdf, zip  docx,,"),
            vec!["pdf".to_string(), "zip".to_string(), "docx".to_string()]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_include_s() {
        assert_eq!(include_s(0), "s");
        assert_eq!(include_s(1), "");
        assert_eq!(include_s(2), "s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 bytes");
        assert_eq!(format_bytes(1), "1 byte");
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_five_point_rating() {
        assert!((five_point_rating(0, 0, 0, 0, 10) - 5.0).abs() < f64::EPSILON);
        assert!((five_point_rating(10, 10, 10, 10, 10) - 3.0).abs() < f64::EPSILON);
        assert!((five_point_rating(1, 0, 0, 0, 2) - 3.67).abs() < 1e-9);
        assert!(five_point_rating(0, 0, 0, 0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_admin_error_visibility() {
        let shown = admin_error("FILE ID NOT FOUND", true, false);
        assert!(shown.contains("ADMIN ERROR: FILE ID NOT FOUND"));
        assert!(admin_error("FILE ID NOT FOUND", false, false).is_empty());
        assert!(admin_error("FILE ID NOT FOUND", true, true).is_empty());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom&#039;s&lt;/a&gt;"
        );
    }
}
