//! Page-number pagination with `links`/`meta` blocks.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Raw `?page=&per_page=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize, TS)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A resolved page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl PageParams {
    pub fn resolve(&self, default_per_page: u32, max_per_page: u32) -> Page {
        let max_per_page = max_per_page.max(1);
        let per_page = self
            .per_page
            .unwrap_or(default_per_page)
            .clamp(1, max_per_page);
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page,
        }
    }
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct PageLinks {
    pub first: String,
    pub last: String,
    pub prev: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, PartialEq)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub links: PageLinks,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    /// Wrap one page of rows. `path` is the request path the links point back to.
    pub fn new(data: Vec<T>, total: i64, page: Page, path: &str) -> Self {
        let total = total.max(0);
        let per_page = i64::from(page.per_page);
        let last_page = ((total + per_page - 1) / per_page).max(1) as u32;

        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = page.offset() + 1;
            (Some(from), Some(from + data.len() as i64 - 1))
        };

        let link = |n: u32| format!("{path}?page={n}&per_page={}", page.per_page);
        let links = PageLinks {
            first: link(1),
            last: link(last_page),
            prev: (page.page > 1).then(|| link((page.page - 1).min(last_page))),
            next: (page.page < last_page).then(|| link(page.page + 1)),
        };

        Self {
            data,
            links,
            meta: PageMeta {
                current_page: page.page,
                per_page: page.per_page,
                total,
                last_page,
                from,
                to,
                path: path.to_string(),
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            links: self.links,
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_clamps_per_page() {
        let params = PageParams {
            page: Some(0),
            per_page: Some(500),
        };
        let page = params.resolve(15, 100);
        assert_eq!(page, Page::new(1, 100));
        assert_eq!(PageParams::default().resolve(15, 100), Page::new(1, 15));
    }

    #[test]
    fn offset_follows_page_number() {
        assert_eq!(Page::new(3, 10).offset(), 20);
        assert_eq!(Page::new(1, 10).offset(), 0);
    }

    #[test]
    fn middle_page_has_both_links() {
        let page = Paginated::new(vec![1, 2], 6, Page::new(2, 2), "/api/things");
        assert_eq!(page.meta.last_page, 3);
        assert_eq!(page.meta.from, Some(3));
        assert_eq!(page.meta.to, Some(4));
        assert_eq!(
            page.links.prev.as_deref(),
            Some("/api/things?page=1&per_page=2")
        );
        assert_eq!(
            page.links.next.as_deref(),
            Some("/api/things?page=3&per_page=2")
        );
    }

    #[test]
    fn empty_result_has_single_page() {
        let page: Paginated<i32> = Paginated::new(vec![], 0, Page::new(1, 15), "/api/things");
        assert_eq!(page.meta.last_page, 1);
        assert_eq!(page.meta.from, None);
        assert!(page.links.prev.is_none());
        assert!(page.links.next.is_none());
        assert_eq!(page.links.first, page.links.last);
    }
}
