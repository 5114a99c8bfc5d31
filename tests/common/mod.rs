//! In-memory stand-in for the browser session.
#![allow(dead_code)]

use async_trait::async_trait;
use listing_scout::core::config::{parse_config, ScoutConfig, SiteConfig, StageDelays};
use listing_scout::features::antibot::Politeness;
use listing_scout::features::snapshots::DebugSnapshots;
use listing_scout::tools::StageSession;
use listing_scout::{FetchError, Fetcher, RenderedDocument};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://shop.test/";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Serves canned pages by URL. Typing a keyword swaps the current page for the
/// markup registered under that keyword, as a live dropdown would.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    typed: HashMap<String, String>,
    current: Option<RenderedDocument>,
    pub visited: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    pub fn on_typing(mut self, text: &str, html: impl Into<String>) -> Self {
        self.typed.insert(text.to_string(), html.into());
        self
    }

    fn lookup(&self, url: &str) -> Option<&String> {
        self.pages
            .get(url)
            .or_else(|| url.split('#').next().and_then(|u| self.pages.get(u)))
    }
}

fn has_any(doc: &RenderedDocument, landmarks: &[String]) -> bool {
    let html = Html::parse_document(&doc.body_html);
    landmarks.iter().any(|css| {
        Selector::parse(css)
            .map(|sel| html.select(&sel).next().is_some())
            .unwrap_or(false)
    })
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn navigate(&mut self, url: &str) -> Result<RenderedDocument, FetchError> {
        self.visited.lock().unwrap().push(url.to_string());
        let html = self
            .lookup(url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("no fixture for {}", url)))?;
        let doc = RenderedDocument::from_html(url, html);
        self.current = Some(doc.clone());
        Ok(doc)
    }

    async fn wait_for(
        &mut self,
        landmarks: &[String],
        _timeout: Duration,
    ) -> Result<RenderedDocument, FetchError> {
        let current = self
            .current
            .clone()
            .ok_or_else(|| FetchError::Other("no page loaded".to_string()))?;
        if landmarks.is_empty() || has_any(&current, landmarks) {
            Ok(current)
        } else {
            Err(FetchError::Timeout(format!("none of {:?}", landmarks)))
        }
    }

    async fn type_into(&mut self, selector: &str, text: &str) -> Result<(), FetchError> {
        let current = self
            .current
            .clone()
            .ok_or_else(|| FetchError::Other("no page loaded".to_string()))?;
        if !has_any(&current, &[selector.to_string()]) {
            return Err(FetchError::Other(format!("no element matches {}", selector)));
        }
        if let Some(html) = self.typed.get(text) {
            self.current = Some(RenderedDocument::from_html(current.final_url, html.clone()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub const SITE_JSON: &str = r#"{
    "keywords": ["widget"],
    "sites": {
        "shop": {
            "base_url": "https://shop.test/",
            "autocomplete": {
                "source": { "dropdown": {
                    "search_bar_selector": "input#gh-ac",
                    "container_selector": "ul#ui-autocomplete"
                } },
                "parser": "ebay_list"
            },
            "search_url_template": "https://shop.test/sch/i.html?_nkw={searchTerm}",
            "search_url_template_with_category": "https://shop.test/sch/i.html?_nkw={searchTerm}&_sacat={categoryId}",
            "allowed_category_keywords": ["Tools"],
            "max_pages": 5
        }
    }
}"#;

pub fn config() -> ScoutConfig {
    parse_config(SITE_JSON, Path::new("fixture.json")).unwrap()
}

/// The fixture site with pauses disabled.
pub fn site() -> SiteConfig {
    let mut site = config().sites["shop"].clone();
    site.delays = StageDelays::none();
    site
}

pub fn session(fetcher: FixtureFetcher) -> StageSession<FixtureFetcher> {
    StageSession::new(
        fetcher,
        Politeness::new(StageDelays::none()),
        DebugSnapshots::disabled(),
        Duration::from_millis(50),
    )
}

pub fn home_page() -> String {
    r#"<html><head><title>Shop</title></head><body>
        <form><input id="gh-ac" type="text"></form>
    </body></html>"#
        .to_string()
}

/// Home page with an open suggestion dropdown.
pub fn home_with_dropdown(options: &[(&str, Option<(&str, &str)>)]) -> String {
    let items: String = options
        .iter()
        .map(|(term, cat)| match cat {
            Some((name, id)) => format!(
                r#"<li role="option" data-value="{term}" data-cat-id="{id}">
                     <span class="ebayui-ellipsis-3">{term}</span>
                     <div class="ebay-autocomplete-cat">in {name}</div>
                   </li>"#
            ),
            None => format!(
                r#"<li role="option" data-value="{term}"><span class="ebayui-ellipsis-3">{term}</span></li>"#
            ),
        })
        .collect();
    format!(
        r#"<html><head><title>Shop</title></head><body>
            <form><input id="gh-ac" type="text"></form>
            <ul id="ui-autocomplete">{items}</ul>
        </body></html>"#
    )
}

/// Search page listing `items` (relative `/itm/<id>` links) with an optional next link.
pub fn search_page(items: &[&str], next: Option<&str>) -> String {
    let lis: String = items
        .iter()
        .map(|id| {
            format!(
                r#"<li class="s-item">
                     <a class="s-item__link" href="/itm/{id}">link</a>
                     <div class="s-item__title"><span role="heading">Listing {id}</span></div>
                     <span class="s-item__price">$1{id}.00</span>
                   </li>"#
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="pagination__next" href="{href}">Next</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>Results</title></head><body>
            <ul class="srp-results">{lis}</ul>
            {next}
        </body></html>"#
    )
}

pub fn product_page(id: &str, title: &str, price: &str) -> String {
    format!(
        r#"<html><head><title>{title} | Shop</title></head><body>
            <h1 class="x-item-title__mainTitle"><span class="ux-textspans">{title}</span></h1>
            <div class="x-price-primary"><span class="ux-textspans">{price}</span></div>
            <div class="ux-layout-section__textual-display--itemId">
              <span class="ux-textspans--BOLD">{id}</span>
            </div>
            <div class="ux-image-carousel-item">
              <img src="https://i.shop.test/images/g/{id}/s-l500.jpg">
            </div>
        </body></html>"#
    )
}

pub fn challenge_page() -> String {
    r#"<html><head><title>Pardon Our Interruption...</title></head><body>
        <p>Please verify you are a human.</p>
    </body></html>"#
        .to_string()
}
