//! Offset pagination for list endpoints.

use quill_api_types::{PageLink, Pagination};

use super::query::QueryParameters;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 5;

/// A 1-based page of `limit` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    page: u64,
    limit: u64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageWindow {
    /// Values below 1 are replaced by the defaults.
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            limit: if limit == 0 { DEFAULT_LIMIT } else { limit },
        }
    }

    /// Read `page` and `limit` with leading-integer semantics (`"3abc"` → 3).
    /// Missing, non-numeric or non-positive values fall back to the defaults.
    pub fn from_parameters(params: &QueryParameters) -> Self {
        let read = |key: &str| {
            params
                .scalar(key)
                .and_then(parse_leading_int)
                .and_then(|value| u64::try_from(value).ok())
                .unwrap_or(0)
        };
        Self::new(read("page"), read("limit"))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of records skipped before this page.
    pub fn start_index(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Exclusive index of the last record on this page.
    pub fn end_index(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }

    /// Links to the neighbouring pages given the collection size.
    pub fn links(&self, total: u64) -> Pagination {
        let next = (self.end_index() < total).then(|| PageLink {
            page: self.page + 1,
            limit: self.limit,
        });
        let prev = (self.start_index() > 0).then(|| PageLink {
            page: self.page - 1,
            limit: self.limit,
        });
        Pagination { next, prev }
    }
}

/// Parse an optionally signed decimal prefix, ignoring leading whitespace and
/// any trailing garbage. Returns `None` when no digit follows the sign.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .bytes()
        .position(|byte| !byte.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(query: &str) -> PageWindow {
        PageWindow::from_parameters(&QueryParameters::parse(query))
    }

    #[test]
    fn leading_integer_parse() {
        assert_eq!(parse_leading_int("3abc"), Some(3));
        assert_eq!(parse_leading_int("  42"), Some(42));
        assert_eq!(parse_leading_int("-2"), Some(-2));
        assert_eq!(parse_leading_int("+7x"), Some(7));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("99999999999999999999"), Some(i64::MAX));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        assert_eq!(window(""), PageWindow::new(1, 5));
        assert_eq!(window("page=abc&limit=0"), PageWindow::new(1, 5));
        assert_eq!(window("page=-3&limit=-1"), PageWindow::new(1, 5));
        assert_eq!(window("page=3abc&limit=10"), PageWindow::new(3, 10));
    }

    #[test]
    fn second_page_links_both_ways_when_more_remain() {
        let window = window("page=2&limit=5");
        assert_eq!(window.start_index(), 5);
        assert_eq!(window.end_index(), 10);

        let links = window.links(11);
        assert_eq!(links.next, Some(PageLink { page: 3, limit: 5 }));
        assert_eq!(links.prev, Some(PageLink { page: 1, limit: 5 }));

        let links = window.links(10);
        assert_eq!(links.next, None);
    }

    #[test]
    fn first_page_has_no_prev() {
        let links = PageWindow::default().links(12);
        assert_eq!(links.prev, None);
        assert_eq!(links.next, Some(PageLink { page: 2, limit: 5 }));
    }

    #[test]
    fn empty_collection_has_no_links() {
        assert_eq!(PageWindow::default().links(0), Pagination::default());
    }
}
