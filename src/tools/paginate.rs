//! Search-result pagination for one query, as an explicit state machine.
//!
//! ```text
//! Fetching ──► Extracting ──► Continue ──► Fetching ...
//!    │             │
//!    └─► Aborted   ├─► Done
//!                  └─► Aborted
//! ```
//!
//! [`Paginator::advance`] runs exactly one page so the caller can visit that
//! page's items on the same session before the next search page is requested.

use super::session::{report, StageSession};
use crate::core::config::SiteConfig;
use crate::core::error::StageError;
use crate::core::types::{ListingStub, PageContext, SearchQuery};
use crate::extract::rules::ListingRules;
use crate::extract::{first_match, selector};
use crate::features::antibot::Stage;
use crate::scraping::fetcher::{Fetcher, RenderedDocument};
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub enum PageState {
    Fetching { url: String, page_number: u32 },
    Extracting { doc: RenderedDocument, requested: String, page_number: u32 },
    Continue { next_url: String, next_page: u32 },
    Done,
    Aborted(StageError),
}

impl PageState {
    pub fn name(&self) -> &'static str {
        match self {
            PageState::Fetching { .. } => "fetching",
            PageState::Extracting { .. } => "extracting",
            PageState::Continue { .. } => "continue",
            PageState::Done => "done",
            PageState::Aborted(_) => "aborted",
        }
    }
}

/// Listings found on one search page.
#[derive(Debug)]
pub struct SearchPage {
    pub context: Arc<PageContext>,
    pub stubs: Vec<ListingStub>,
    /// Validated link to the following page, if any.
    pub next_url: Option<String>,
}

pub struct Paginator {
    query: Arc<SearchQuery>,
    state: PageState,
    visited: HashSet<String>,
    max_pages: u32,
    page_param: String,
    fetches: u32,
}

impl Paginator {
    pub fn new(query: Arc<SearchQuery>, site: &SiteConfig) -> Self {
        let state = PageState::Fetching {
            url: query.search_url.clone(),
            page_number: 1,
        };
        Self {
            query,
            state,
            visited: HashSet::new(),
            max_pages: site.max_pages.max(1),
            page_param: site.page_param.clone(),
            fetches: 0,
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, PageState::Aborted(_))
    }

    /// Number of times the machine entered `Fetching`.
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    /// Drive one page to `Continue`, `Done` or `Aborted`. `None` once finished
    /// or when the page could not be fetched.
    pub async fn advance<F: Fetcher>(
        &mut self,
        session: &mut StageSession<F>,
        site: &SiteConfig,
    ) -> Option<SearchPage> {
        loop {
            let state = std::mem::replace(&mut self.state, PageState::Done);
            let next = match state {
                PageState::Continue { next_url, next_page } => PageState::Fetching {
                    url: next_url,
                    page_number: next_page,
                },
                PageState::Fetching { url, page_number } => {
                    self.fetches += 1;
                    self.visited.insert(url.clone());
                    info!(
                        term = %self.query.search_term,
                        page = page_number,
                        url = %url,
                        "📄 fetching search page"
                    );
                    match session.visit(Stage::Search, &url, &site.landmarks.search).await {
                        Ok(doc) => PageState::Extracting {
                            doc,
                            requested: url,
                            page_number,
                        },
                        Err(err) => {
                            let label = format!("search {} page {}", self.query.search_term, page_number);
                            report("search", &label, &err);
                            session.snapshot(&label).await;
                            self.state = PageState::Aborted(err);
                            return None;
                        }
                    }
                }
                PageState::Extracting {
                    doc,
                    requested,
                    page_number,
                } => {
                    let page_url = if doc.final_url.is_empty() {
                        requested
                    } else {
                        doc.final_url.clone()
                    };
                    self.visited.insert(page_url.clone());
                    let context = Arc::new(PageContext {
                        search_url: page_url.clone(),
                        page_number,
                        query: self.query.clone(),
                    });

                    let (stubs, candidate) =
                        extract_search_page(&doc.body_html, &page_url, &site.rules.listing, &context);
                    debug!(page = page_number, "{} listings", stubs.len());
                    if stubs.is_empty() {
                        warn!(
                            term = %self.query.search_term,
                            page = page_number,
                            "no listings found on search page"
                        );
                    }

                    let next_url = candidate.and_then(|next| {
                        validate_next(&page_url, &next, &self.visited, &self.page_param)
                    });
                    self.state = match &next_url {
                        Some(next) if page_number < self.max_pages => PageState::Continue {
                            next_url: next.clone(),
                            next_page: page_number + 1,
                        },
                        Some(_) => {
                            info!(page = page_number, "page cap {} reached", self.max_pages);
                            PageState::Done
                        }
                        None => PageState::Done,
                    };
                    return Some(SearchPage {
                        context,
                        stubs,
                        next_url,
                    });
                }
                finished @ (PageState::Done | PageState::Aborted(_)) => {
                    self.state = finished;
                    return None;
                }
            };
            self.state = next;
        }
    }
}

/// Listing stubs and the raw "next" link of a rendered search page.
pub fn extract_search_page(
    body_html: &str,
    page_url: &str,
    rules: &ListingRules,
    context: &Arc<PageContext>,
) -> (Vec<ListingStub>, Option<String>) {
    let doc = Html::parse_document(body_html);
    let base = Url::parse(page_url).ok();
    let resolve = |href: String| -> Option<String> {
        match &base {
            Some(b) => b.join(href.trim()).ok().map(|u| u.to_string()),
            None => Url::parse(href.trim()).ok().map(|u| u.to_string()),
        }
    };

    let nodes = rules
        .containers
        .iter()
        .filter_map(|css| selector(css))
        .map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .find(|nodes| !nodes.is_empty())
        .unwrap_or_default();

    let stubs = nodes
        .into_iter()
        .filter_map(|node| {
            let item_url = first_match(node, &rules.link).and_then(&resolve)?;
            Some(ListingStub {
                item_url,
                title_hint: first_match(node, &rules.title),
                price_hint: first_match(node, &rules.price),
                context: context.clone(),
            })
        })
        .collect();

    let next = first_match(doc.root_element(), &rules.next_page).and_then(&resolve);
    (stubs, next)
}

/// Accept `next` only if it really leads to another page.
pub fn validate_next(
    current: &str,
    next: &str,
    visited: &HashSet<String>,
    page_param: &str,
) -> Option<String> {
    if next == current {
        warn!("next page link points at the current page; stopping");
        return None;
    }
    if visited.contains(next) {
        warn!(url = next, "next page already visited; stopping");
        return None;
    }
    let (Ok(cur), Ok(nxt)) = (Url::parse(current), Url::parse(next)) else {
        return Some(next.to_string());
    };
    match (page_marker(&cur, page_param), page_marker(&nxt, page_param)) {
        (Some(a), Some(b)) if a == b => {
            warn!(url = next, "next page has the same {}={}; stopping", page_param, a);
            None
        }
        (None, None) if cur.path() == nxt.path() => {
            warn!(url = next, "next page looks identical to the current one; stopping");
            None
        }
        _ => Some(next.to_string()),
    }
}

fn page_marker(url: &Url, page_param: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == page_param)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<PageContext> {
        Arc::new(PageContext {
            search_url: "https://www.ebay.com/sch/i.html?_nkw=widget".to_string(),
            page_number: 1,
            query: Arc::new(SearchQuery {
                search_term: "widget".to_string(),
                category_id: None,
                category_name: None,
                source_keyword: "widget".to_string(),
                search_url: "https://www.ebay.com/sch/i.html?_nkw=widget".to_string(),
            }),
        })
    }

    #[test]
    fn test_same_page_marker_with_fragment_rejected() {
        let visited = HashSet::new();
        assert_eq!(
            validate_next(
                "https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=2",
                "https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=2#top",
                &visited,
                "_pgn"
            ),
            None
        );
        assert_eq!(
            validate_next(
                "https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=2",
                "https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=3",
                &visited,
                "_pgn"
            )
            .as_deref(),
            Some("https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=3")
        );
    }

    #[test]
    fn test_markerless_same_path_rejected_and_visited_guard() {
        let mut visited = HashSet::new();
        assert_eq!(
            validate_next(
                "https://shop.test/search?q=a",
                "https://shop.test/search?q=a&sort=new",
                &visited,
                "_pgn"
            ),
            None
        );
        visited.insert("https://shop.test/search?q=a&_pgn=1".to_string());
        assert_eq!(
            validate_next(
                "https://shop.test/search?q=a&_pgn=2",
                "https://shop.test/search?q=a&_pgn=1",
                &visited,
                "_pgn"
            ),
            None
        );
        assert_eq!(
            validate_next("https://shop.test/s", "https://shop.test/s", &visited, "_pgn"),
            None
        );
    }

    #[test]
    fn test_extract_stubs_and_next() {
        let html = r#"<html><body>
            <ul class="srp-results">
              <li class="s-item">
                <a class="s-item__link" href="/itm/111?hash=x">x</a>
                <div class="s-item__title"><span role="heading">Widget One</span></div>
                <span class="s-item__price">$10.00</span>
              </li>
              <li class="s-item"><div class="s-item__title">No link here</div></li>
              <li class="s-item"><a class="s-item__link" href="https://www.ebay.com/itm/222">y</a></li>
            </ul>
            <a class="pagination__next" href="/sch/i.html?_nkw=widget&amp;_pgn=2">Next</a>
        </body></html>"#;
        let (stubs, next) = extract_search_page(
            html,
            "https://www.ebay.com/sch/i.html?_nkw=widget",
            &ListingRules::default(),
            &context(),
        );
        assert_eq!(stubs.len(), 2);
        assert_eq!(stubs[0].item_url, "https://www.ebay.com/itm/111?hash=x");
        assert_eq!(stubs[0].title_hint.as_deref(), Some("Widget One"));
        assert_eq!(stubs[0].price_hint.as_deref(), Some("$10.00"));
        assert_eq!(stubs[1].title_hint, None);
        assert_eq!(
            next.as_deref(),
            Some("https://www.ebay.com/sch/i.html?_nkw=widget&_pgn=2")
        );
    }
}
