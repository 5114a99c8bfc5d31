use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One concrete search to run, derived from a seed keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search_term: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    /// The seed keyword this query was expanded from.
    pub source_keyword: String,
    /// First search-results page for this query.
    pub search_url: String,
}

/// Where a listing was found. Shared read-only by every stub on that page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub search_url: String,
    /// 1-based.
    pub page_number: u32,
    pub query: Arc<SearchQuery>,
}

/// A single search-result entry pointing at a product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingStub {
    pub item_url: String,
    pub title_hint: Option<String>,
    pub price_hint: Option<String>,
    pub context: Arc<PageContext>,
}

/// Normalized product record handed to the sink.
///
/// Provenance (`source_keyword`, `search_url`) is always set, whatever the
/// extraction managed to recover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    /// Source of an out-of-line (iframe) description that was not fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub brand: Option<String>,
    pub location: Option<String>,

    pub seller_name: Option<String>,
    pub seller_rating: Option<String>,
    pub seller_feedback_count: Option<u64>,
    pub seller_link: Option<String>,
    pub free_returns: bool,
    pub top_rated_seller: bool,

    /// Final product page URL.
    pub link: String,

    pub source_keyword: String,
    pub search_term: String,
    pub category_context: Option<String>,
    pub search_url: String,
    pub page_number: u32,
    pub scraped_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Empty record carrying only the provenance of `stub`.
    pub fn from_stub(stub: &ListingStub, link: &str) -> Self {
        let ctx = &stub.context;
        Self {
            product_id: None,
            title: None,
            price: None,
            description: None,
            description_url: None,
            images: Vec::new(),
            category: None,
            condition: None,
            brand: None,
            location: None,
            seller_name: None,
            seller_rating: None,
            seller_feedback_count: None,
            seller_link: None,
            free_returns: false,
            top_rated_seller: false,
            link: link.to_string(),
            source_keyword: ctx.query.source_keyword.clone(),
            search_term: ctx.query.search_term.clone(),
            category_context: ctx.query.category_name.clone(),
            search_url: ctx.search_url.clone(),
            page_number: ctx.page_number,
            scraped_at: Utc::now(),
        }
    }

    /// Title, price and identifier all unrecovered: usually selector drift.
    pub fn missing_core_fields(&self) -> bool {
        self.title.is_none() && self.price.is_none() && self.product_id.is_none()
    }
}

/// Counters for one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub keywords: usize,
    pub keywords_aborted: usize,
    pub queries: usize,
    pub search_pages: usize,
    pub paginations_aborted: usize,
    pub products_visited: usize,
    pub products_skipped: usize,
    pub records: usize,
    pub interrupted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> ListingStub {
        let query = Arc::new(SearchQuery {
            search_term: "widget pro".to_string(),
            category_id: Some("293".to_string()),
            category_name: Some("Electronics".to_string()),
            source_keyword: "widget".to_string(),
            search_url: "https://shop.test/s?q=widget+pro".to_string(),
        });
        ListingStub {
            item_url: "https://shop.test/itm/1".to_string(),
            title_hint: None,
            price_hint: None,
            context: Arc::new(PageContext {
                search_url: "https://shop.test/s?q=widget+pro&_pgn=2".to_string(),
                page_number: 2,
                query,
            }),
        }
    }

    #[test]
    fn test_from_stub_keeps_provenance() {
        let record = ProductRecord::from_stub(&stub(), "https://shop.test/itm/1");
        assert_eq!(record.source_keyword, "widget");
        assert_eq!(record.search_term, "widget pro");
        assert_eq!(record.search_url, "https://shop.test/s?q=widget+pro&_pgn=2");
        assert_eq!(record.page_number, 2);
        assert_eq!(record.category_context.as_deref(), Some("Electronics"));
        assert!(record.missing_core_fields());
    }

    #[test]
    fn test_description_url_omitted_when_absent() {
        let record = ProductRecord::from_stub(&stub(), "https://shop.test/itm/1");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("description_url").is_none());
        assert_eq!(json["source_keyword"], "widget");
    }
}
