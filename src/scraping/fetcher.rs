//! The document-fetching boundary.
//!
//! Everything above this module sees a site only through [`Fetcher`]: one
//! stateful rendering session with a single "current page". The production
//! implementation is [`super::browser_manager::BrowserSession`]; tests drive
//! the pipeline with in-memory fixtures.

use crate::core::error::FetchError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;

/// A page after client-side scripts have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// URL after redirects.
    pub final_url: String,
    pub title: String,
    pub body_html: String,
}

impl RenderedDocument {
    pub fn new(
        final_url: impl Into<String>,
        title: impl Into<String>,
        body_html: impl Into<String>,
    ) -> Self {
        Self {
            final_url: final_url.into(),
            title: title.into(),
            body_html: body_html.into(),
        }
    }

    /// Build a document from raw markup, taking the title from `<title>`.
    pub fn from_html(final_url: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let title = title_of(&html).unwrap_or_default();
        Self::new(final_url, title, html)
    }

    pub fn parse(&self) -> Html {
        Html::parse_document(&self.body_html)
    }
}

fn title_of(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("title").ok()?;
    doc.select(&sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

/// One exclusively-owned rendering session.
///
/// Calls are strictly sequential (`&mut self`); implementations never have two
/// navigations in flight.
#[async_trait]
pub trait Fetcher: Send {
    /// Navigate the session to `url` and return the rendered page.
    async fn navigate(&mut self, url: &str) -> Result<RenderedDocument, FetchError>;

    /// Wait until any of `landmarks` (CSS selectors) is present on the current
    /// page, then return it. An empty list returns the current page immediately.
    async fn wait_for(
        &mut self,
        landmarks: &[String],
        timeout: Duration,
    ) -> Result<RenderedDocument, FetchError>;

    /// Focus the element matching `selector` on the current page and type `text`.
    async fn type_into(&mut self, selector: &str, text: &str) -> Result<(), FetchError>;

    /// PNG of the current page, when the backend can render one.
    async fn screenshot(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Release the underlying session. Must be safe to call more than once.
    async fn close(&mut self) {}
}
