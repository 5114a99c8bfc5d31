//! Product detail page → [`ProductRecord`].

use super::session::{report, StageSession};
use crate::core::config::SiteConfig;
use crate::core::error::StageError;
use crate::core::types::{ListingStub, ProductRecord};
use crate::extract::images::normalize_images;
use crate::extract::jsonld::{self, StructuredProduct};
use crate::extract::rules::{Field, ProductRules};
use crate::extract::{apply_all, extract_fields, Extracted};
use crate::features::antibot::Stage;
use crate::features::challenge::ChallengeDetector;
use crate::scraping::fetcher::{Fetcher, RenderedDocument};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug)]
pub enum ProductOutcome {
    Record(Box<ProductRecord>),
    /// Bot challenge instead of the product page; no record.
    Challenge(StageError),
    /// Navigation failed or timed out; no record.
    Failed(StageError),
}

impl ProductOutcome {
    pub fn record(self) -> Option<ProductRecord> {
        match self {
            ProductOutcome::Record(r) => Some(*r),
            _ => None,
        }
    }
}

fn item_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/itm/(?:[^/?#]+/)?(\d+)").expect("valid item path regex"))
}

fn parenthesized_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d[\d,]*)\)").expect("valid feedback regex"))
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d[\d,]*)\s*$").expect("valid number regex"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid digits regex"))
}

/// Navigate to the stub's item page and extract it.
pub async fn visit_product<F: Fetcher>(
    session: &mut StageSession<F>,
    stub: &ListingStub,
    site: &SiteConfig,
) -> ProductOutcome {
    match session
        .visit(Stage::Product, &stub.item_url, &site.landmarks.product)
        .await
    {
        Ok(doc) => extract_product(&doc, stub, &site.rules.product),
        Err(err) => {
            let label = format!("item {}", item_id_from_url(&stub.item_url).unwrap_or_default());
            report("product", &stub.item_url, &err);
            session.snapshot(&label).await;
            if err.is_challenge() {
                ProductOutcome::Challenge(err)
            } else {
                ProductOutcome::Failed(err)
            }
        }
    }
}

/// Build a record from a rendered product page.
///
/// Structured data supplies what it can; the rule engine fills the rest, and
/// listing hints fill a still-missing title or price.
pub fn extract_product(
    doc: &RenderedDocument,
    stub: &ListingStub,
    rules: &ProductRules,
) -> ProductOutcome {
    if let Some(signal) = ChallengeDetector::shared().classify(doc) {
        return ProductOutcome::Challenge(StageError::Challenge {
            url: doc.final_url.clone(),
            marker: signal.to_string(),
        });
    }

    let link = if doc.final_url.is_empty() {
        stub.item_url.clone()
    } else {
        doc.final_url.clone()
    };
    let url_id = item_id_from_url(&link).or_else(|| item_id_from_url(&stub.item_url));

    let html = doc.parse();
    let root = html.root_element();
    let structured = jsonld::find_product(&html, url_id.as_deref(), &link).unwrap_or_default();
    if structured.name.is_some() {
        debug!(url = %link, "using structured product data");
    }

    let mut fields = extract_fields(root, &rules.fields, |f| supplied_by(&structured, f));
    let raw_images: Vec<String> = structured
        .images
        .iter()
        .cloned()
        .chain(rules.images.iter().flat_map(|s| apply_all(root, s)))
        .collect();

    let mut record = ProductRecord::from_stub(stub, &link);
    record.title = structured
        .name
        .or_else(|| fields.take(Field::Title))
        .or_else(|| stub.title_hint.clone());
    record.price = structured
        .price
        .or_else(|| fields.take(Field::Price))
        .or_else(|| stub.price_hint.clone());
    record.brand = structured.brand.or_else(|| fields.take(Field::Brand));
    record.condition = structured.condition.or_else(|| fields.take(Field::Condition));

    record.description = fields.take(Field::Description);
    if record.description.is_none() {
        record.description_url = fields
            .take(Field::DescriptionFrame)
            .and_then(|src| absolutize(&link, &src));
    }
    record.images = normalize_images(raw_images, &link, &rules.image_policy);
    let query = &stub.context.query;
    record.category = fields.take(Field::Category).or_else(|| {
        query
            .category_id
            .as_ref()
            .and_then(|_| query.category_name.clone())
    });
    record.location = fields.take(Field::Location);

    record.seller_name = fields.take(Field::SellerName);
    record.seller_rating = fields.take(Field::SellerRating);
    record.seller_feedback_count = fields
        .get(Field::SellerFeedback)
        .and_then(parse_feedback_count);
    record.seller_link = fields
        .take(Field::SellerLink)
        .and_then(|href| absolutize(&link, &href));
    record.free_returns = fields
        .get(Field::ReturnsText)
        .is_some_and(|t| mentions_free_returns(t, &rules.free_returns_phrases));
    record.top_rated_seller = fields.is_set(Field::TopRatedBadge);
    record.product_id = url_id.or_else(|| embedded_item_id(&fields));

    if record.missing_core_fields() {
        warn!(
            keyword = %record.source_keyword,
            term = %record.search_term,
            page = record.page_number,
            url = %record.link,
            "core fields missing (title, price, id); selectors may have drifted"
        );
    }
    ProductOutcome::Record(Box::new(record))
}

fn supplied_by(structured: &StructuredProduct, field: Field) -> bool {
    match field {
        Field::Title => structured.name.is_some(),
        Field::Price => structured.price.is_some(),
        Field::Brand => structured.brand.is_some(),
        Field::Condition => structured.condition.is_some(),
        _ => false,
    }
}

/// `/itm/123` or `/itm/some-slug/123`.
pub fn item_id_from_url(url: &str) -> Option<String> {
    item_path_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn embedded_item_id(fields: &Extracted) -> Option<String> {
    let raw = fields.get(Field::ItemId)?;
    Some(
        digits_re()
            .find(raw)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| raw.to_string()),
    )
}

/// `98.7% positive (12,345)` → 12345; a bare `1,024` is accepted too.
pub fn parse_feedback_count(text: &str) -> Option<u64> {
    let caps = parenthesized_number_re()
        .captures(text)
        .or_else(|| bare_number_re().captures(text))?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

pub fn mentions_free_returns(text: &str, phrases: &[String]) -> bool {
    let lower = text.to_lowercase();
    let squashed: String = lower.split_whitespace().collect();
    phrases.iter().any(|p| {
        let p = p.to_lowercase();
        lower.contains(&p) || squashed.contains(&p)
    })
}

fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(base) {
        Ok(b) => b.join(href).ok().map(|u| u.to_string()),
        Err(_) => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
