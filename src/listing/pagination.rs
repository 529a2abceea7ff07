//! Page arithmetic shared by the download log view and file lists.

use serde::Serialize;

/// Page-size choices offered by the download log view.
pub const PER_PAGE_CHOICES: [u32; 4] = [5, 10, 25, 50];

/// The page to show out of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub per_page: u32,
    pub total_pages: u64,
    /// 1-based; clamped to the last page.
    pub page: u64,
}

impl Pagination {
    /// Clamps `requested` into `1..=total_pages`. A page size of 0 counts as 1.
    #[must_use]
    pub fn new(total: u64, per_page: u32, requested: u64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total.div_ceil(u64::from(per_page));
        let page = requested.max(1).min(total_pages.max(1));
        Self {
            total,
            per_page,
            total_pages,
            page,
        }
    }

    /// Index of the first item on the page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page - 1) * u64::from(self.per_page)
    }

    /// The items of this page.
    #[must_use]
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX).min(items.len());
        let end = start.saturating_add(self.per_page as usize).min(items.len());
        &items[start..end]
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// The fixed choices plus `current`, sorted.
#[must_use]
pub fn per_page_choices(current: u32) -> Vec<u32> {
    let mut choices = PER_PAGE_CHOICES.to_vec();
    if !choices.contains(&current) {
        choices.push(current);
        choices.sort_unstable();
    }
    choices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_beyond_last_shows_last_page() {
        let items: Vec<u32> = (1..=12).collect();
        let pagination = Pagination::new(12, 5, 9);
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.slice(&items), &[11, 12]);
        assert!(!pagination.has_next());
        assert!(pagination.has_previous());
    }

    #[test]
    fn test_empty_result_is_page_one_without_rows() {
        let pagination = Pagination::new(0, 25, 4);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.total_pages, 0);
        assert!(pagination.slice::<u8>(&[]).is_empty());
    }

    #[test]
    fn test_page_zero_means_first_page() {
        let pagination = Pagination::new(30, 10, 0);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_per_page_choices_include_current() {
        assert_eq!(per_page_choices(25), vec![5, 10, 25, 50]);
        assert_eq!(per_page_choices(7), vec![5, 7, 10, 25, 50]);
    }
}
