//! Paginated result sets.

use serde::{Deserialize, Serialize};

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: usize = 50;

/// One page of results. `has_more` is known without a count query because
/// one extra row is fetched past the page end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page from rows fetched with `limit = per_page + 1`.
    pub fn from_overfetch(mut rows: Vec<T>, page: usize, per_page: usize) -> Self {
        let has_more = rows.len() > per_page;
        rows.truncate(per_page);
        Self {
            items: rows,
            page,
            per_page,
            has_more,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            has_more: self.has_more,
        }
    }
}

/// 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_sets_has_more() {
        let page = Page::from_overfetch(vec![1, 2, 3, 4], 1, 3);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(page.has_more);

        let last = Page::from_overfetch(vec![1, 2], 2, 3);
        assert!(!last.has_more);
    }

    #[test]
    fn request_is_clamped() {
        let req = PageRequest::new(0, 500);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, MAX_PER_PAGE);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }
}
