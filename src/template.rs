use askama_actix::Template;

const PAGINATOR_LOOK_AHEAD: u64 = 2;

/// [1] 2 3 ... 13
/// 1 ... 4 5 [6] 7 8 ... 13
/// 1 ... 11 12 [13]
#[derive(Debug)]
pub struct Paginator {
    /// Listing URL ending in `?` or `&`; `page=N` is appended.
    pub base_url: String,
    pub this_page: u64,
    pub page_count: u64,
}

#[derive(Template)]
#[template(path = "util/paginator.html")]
struct PaginatorTemplate<'a> {
    paginator: &'a Paginator,
}

impl Paginator {
    pub fn new(base_url: String, this_page: u64, page_count: u64) -> Self {
        let page_count = page_count.max(1);
        Self {
            base_url,
            this_page: this_page.clamp(1, page_count),
            page_count,
        }
    }

    pub fn has_pages(&self) -> bool {
        self.page_count > 1
    }

    pub fn is_current_page(&self, page: &u64) -> bool {
        *page == self.this_page
    }

    pub fn page_url(&self, page: &u64) -> String {
        format!("{}page={}", self.base_url, page)
    }

    /// Page numbers to show; None marks a gap.
    pub fn pages(&self) -> Vec<Option<u64>> {
        let low = self.this_page.saturating_sub(PAGINATOR_LOOK_AHEAD).max(1);
        let high = (self.this_page + PAGINATOR_LOOK_AHEAD).min(self.page_count);

        let mut out = Vec::new();
        if low > 1 {
            out.push(Some(1));
            if low > 2 {
                out.push(None);
            }
        }
        out.extend((low..=high).map(Some));
        if high < self.page_count {
            if high + 1 < self.page_count {
                out.push(None);
            }
            out.push(Some(self.page_count));
        }
        out
    }

    pub fn as_html(&self) -> String {
        if !self.has_pages() {
            return String::new();
        }
        PaginatorTemplate { paginator: self }
            .render()
            .unwrap_or_else(|e| {
                log::error!("Paginator: {}", e);
                String::new()
            })
    }
}

/// Parses a 1-based `page` query value.
pub fn page_param(page: Option<u64>) -> u64 {
    page.filter(|p| *p > 0).unwrap_or(1)
}
