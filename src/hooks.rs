//! Extension points.
//!
//! Callers register [`LibraryHook`] implementations on a [`Hooks`] list; each
//! filter receives the value produced by the previous hook, in registration
//! order. Every method has a pass-through default so a hook only overrides
//! what it cares about.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::files::FileRecord;
use crate::users::Requester;

/// Default report link for a guest address, `{ip}` is substituted.
pub const DEFAULT_IP_LOOKUP_PATH: &str = "https://www.criminalip.io/asset/report/{ip}";

/// A set of filters and actions applied by the library.
pub trait LibraryHook: Send + Sync {
    /// Final say on whether a requester may download a file.
    fn filter_meets_requirements(
        &self,
        meets: bool,
        _file: &FileRecord,
        _user_id: i64,
        _roles: &[String],
        _meta_key: &str,
    ) -> bool {
        meets
    }

    /// URL returned to the browser after a download was recorded.
    fn filter_download_url(&self, url: String, _file: &FileRecord, _requester: &Requester) -> String {
        url
    }

    /// Runs after a download has been counted.
    fn after_file_downloaded(&self, _file: &FileRecord, _url: &str, _requester: &Requester) {}

    /// The `Downloaded N times` label of the post layout.
    fn filter_downloaded_count_label(&self, label: String, _count: i64, _file: &FileRecord) -> String {
        label
    }

    /// Extra CSS classes on a rendered file.
    fn filter_classes(&self, classes: String, _file: &FileRecord, _render_type: &str) -> String {
        classes
    }

    /// Reasons to suppress admin errors for one shortcode. Any `true` hides.
    fn hide_error_reasons(&self, reasons: Vec<bool>, _custom_field: &str) -> Vec<bool> {
        reasons
    }

    /// Markup shown before a file's format list, keyed by format.
    fn filter_format_prefixes(
        &self,
        prefixes: BTreeMap<String, String>,
        _file: &FileRecord,
        _render_type: &str,
    ) -> BTreeMap<String, String> {
        prefixes
    }

    /// Icon markup for a file.
    fn filter_icon(&self, icon: String, _file: Option<&FileRecord>, _extension: &str) -> String {
        icon
    }

    /// Public base URL of the upload folder.
    fn filter_base_url(&self, base_url: String) -> String {
        base_url
    }

    /// Lookup link template for guest addresses in the download log.
    fn filter_ip_lookup_path(&self, path: String) -> String {
        path
    }
}

/// Ordered hook registrations.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn LibraryHook>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("registered", &self.hooks.len())
            .finish()
    }
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook; it runs after every hook registered before it.
    pub fn register(&mut self, hook: Arc<dyn LibraryHook>) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn meets_requirements(
        &self,
        meets: bool,
        file: &FileRecord,
        user_id: i64,
        roles: &[String],
        meta_key: &str,
    ) -> bool {
        self.hooks.iter().fold(meets, |acc, hook| {
            hook.filter_meets_requirements(acc, file, user_id, roles, meta_key)
        })
    }

    pub(crate) fn download_url(&self, url: String, file: &FileRecord, requester: &Requester) -> String {
        self.hooks
            .iter()
            .fold(url, |acc, hook| hook.filter_download_url(acc, file, requester))
    }

    pub(crate) fn file_downloaded(&self, file: &FileRecord, url: &str, requester: &Requester) {
        for hook in &self.hooks {
            hook.after_file_downloaded(file, url, requester);
        }
    }

    pub(crate) fn downloaded_count_label(&self, label: String, count: i64, file: &FileRecord) -> String {
        self.hooks
            .iter()
            .fold(label, |acc, hook| hook.filter_downloaded_count_label(acc, count, file))
    }

    pub(crate) fn classes(&self, classes: String, file: &FileRecord, render_type: &str) -> String {
        self.hooks
            .iter()
            .fold(classes, |acc, hook| hook.filter_classes(acc, file, render_type))
    }

    pub(crate) fn hide_error(&self, custom_field: &str) -> bool {
        let reasons = vec![custom_field.ends_with("file_audio")];
        self.hooks
            .iter()
            .fold(reasons, |acc, hook| hook.hide_error_reasons(acc, custom_field))
            .into_iter()
            .any(|reason| reason)
    }

    pub(crate) fn format_prefixes(&self, file: &FileRecord, render_type: &str) -> BTreeMap<String, String> {
        let mut defaults = BTreeMap::new();
        defaults.insert("mp3".to_string(), "<i class=\"fas fa-volume-up\"></i>".to_string());
        defaults.insert("mp4".to_string(), "<i class=\"fas fa-volume-up\"></i>".to_string());
        self.hooks
            .iter()
            .fold(defaults, |acc, hook| hook.filter_format_prefixes(acc, file, render_type))
    }

    pub(crate) fn icon(&self, icon: String, file: Option<&FileRecord>, extension: &str) -> String {
        self.hooks
            .iter()
            .fold(icon, |acc, hook| hook.filter_icon(acc, file, extension))
    }

    pub(crate) fn base_url(&self, base_url: String) -> String {
        self.hooks
            .iter()
            .fold(base_url, |acc, hook| hook.filter_base_url(acc))
    }

    pub(crate) fn ip_lookup_url(&self, ip: &str) -> String {
        self.hooks
            .iter()
            .fold(DEFAULT_IP_LOOKUP_PATH.to_string(), |acc, hook| {
                hook.filter_ip_lookup_path(acc)
            })
            .replace("{ip}", ip)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Deny;

    impl LibraryHook for Deny {
        fn filter_meets_requirements(&self, _: bool, _: &FileRecord, _: i64, _: &[String], _: &str) -> bool {
            false
        }
    }

    struct Suffix(&'static str);

    impl LibraryHook for Suffix {
        fn filter_download_url(&self, url: String, _: &FileRecord, _: &Requester) -> String {
            format!("{url}{}", self.0)
        }
    }

    struct HideAll;

    impl LibraryHook for HideAll {
        fn hide_error_reasons(&self, mut reasons: Vec<bool>, _: &str) -> Vec<bool> {
            reasons.push(true);
            reasons
        }
    }

    fn file() -> FileRecord {
        FileRecord {
            id: 1,
            title: "Guide".to_string(),
            ..FileRecord::default()
        }
    }

    #[test]
    fn test_empty_registry_passes_values_through() {
        let hooks = Hooks::new();
        assert!(hooks.meets_requirements(true, &file(), 0, &[], ""));
        assert_eq!(
            hooks.download_url("u".to_string(), &file(), &Requester::guest(None)),
            "u"
        );
        assert_eq!(
            hooks.ip_lookup_url("203.0.113.5"),
            "https://www.criminalip.io/asset/report/203.0.113.5"
        );
    }

    #[test]
    fn test_filters_chain_in_registration_order() {
        let mut hooks = Hooks::new();
        hooks.register(Arc::new(Suffix("?a")));
        hooks.register(Arc::new(Suffix("&b")));
        hooks.register(Arc::new(Deny));
        assert_eq!(hooks.len(), 3);
        assert_eq!(
            hooks.download_url("https://x/f.pdf".to_string(), &file(), &Requester::guest(None)),
            "https://x/f.pdf?a&b"
        );
        assert!(!hooks.meets_requirements(true, &file(), 5, &[], ""));
    }

    #[test]
    fn test_hide_error_reasons() {
        let mut hooks = Hooks::new();
        assert!(hooks.hide_error("lesson_file_audio"));
        assert!(!hooks.hide_error("lesson_file"));
        hooks.register(Arc::new(HideAll));
        assert!(hooks.hide_error("lesson_file"));
    }

    #[test]
    fn test_default_format_prefixes() {
        let prefixes = Hooks::new().format_prefixes(&file(), "link");
        assert_eq!(prefixes.len(), 2);
        assert!(prefixes["mp3"].contains("fa-volume-up"));
    }
}
