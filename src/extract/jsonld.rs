//! Schema.org `Product` blocks embedded as JSON-LD.

use scraper::{Html, Selector};
use serde_json::{Map, Value};

/// Product facts recovered from structured data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredProduct {
    pub name: Option<String>,
    /// Price with currency code in front when one is given, e.g. `USD 24.99`.
    pub price: Option<String>,
    pub brand: Option<String>,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub offer_urls: Vec<String>,
}

impl StructuredProduct {
    /// Name present, and any price present is numeric.
    pub fn is_consistent(&self) -> bool {
        let named = self.name.as_deref().is_some_and(|n| !n.trim().is_empty());
        let priced = match &self.price {
            Some(p) => p
                .rsplit(' ')
                .next()
                .is_some_and(|amount| amount.replace(',', "").parse::<f64>().is_ok()),
            None => true,
        };
        named && priced
    }
}

/// The `Product` describing this page: its offer URL contains `item_id`, or,
/// without an id, equals `page_url`. Inconsistent candidates are ignored.
pub fn find_product(doc: &Html, item_id: Option<&str>, page_url: &str) -> Option<StructuredProduct> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return None;
    };

    let mut candidates = Vec::new();
    for script in doc.select(&selector) {
        let json_text = script.inner_html();
        if json_text.trim().is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(&json_text) {
            collect_products(&value, &mut candidates);
        }
    }

    candidates
        .into_iter()
        .filter(|p| p.is_consistent())
        .find(|p| matches_page(p, item_id, page_url))
}

fn matches_page(product: &StructuredProduct, item_id: Option<&str>, page_url: &str) -> bool {
    match item_id {
        Some(id) if !id.is_empty() => product.offer_urls.iter().any(|u| u.contains(id)),
        _ => {
            let page = page_url.trim_end_matches('/');
            product
                .offer_urls
                .iter()
                .any(|u| u.trim_end_matches('/') == page)
        }
    }
}

fn collect_products(value: &Value, out: &mut Vec<StructuredProduct>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_products(graph, out);
            }
            if is_type(map, "Product") {
                out.push(product_from(map));
            }
        }
        _ => {}
    }
}

fn is_type(map: &Map<String, Value>, wanted: &str) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

fn product_from(map: &Map<String, Value>) -> StructuredProduct {
    let offers = map.get("offers");
    let mut offer_urls = Vec::new();
    offer_field(offers, "url", &mut offer_urls);
    if let Some(url) = json_ld_string(map.get("url")) {
        offer_urls.push(url);
    }

    let mut conditions = Vec::new();
    offer_field(offers, "itemCondition", &mut conditions);
    let condition = json_ld_string(map.get("itemCondition"))
        .or_else(|| conditions.into_iter().next())
        .map(|c| condition_label(&c));

    StructuredProduct {
        name: json_ld_string(map.get("name")).filter(|n| !n.is_empty()),
        price: json_ld_price(offers),
        brand: json_ld_string(map.get("brand")).filter(|b| !b.is_empty()),
        condition,
        images: json_ld_images(map.get("image")),
        offer_urls,
    }
}

fn json_ld_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| json_ld_string(Some(item)))
            .find(|v| !v.is_empty()),
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(|v| v.as_str())
            .map(|name| name.trim().to_string()),
        _ => None,
    }
}

fn json_ld_price(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Object(map)) => {
            let amount = ["price", "lowPrice", "highPrice"]
                .iter()
                .find_map(|key| json_ld_string(map.get(*key)))
                .filter(|p| !p.is_empty());
            match amount {
                Some(amount) => {
                    let currency = map
                        .get("priceCurrency")
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|c| !c.is_empty());
                    Some(match currency {
                        Some(c) => format!("{} {}", c, amount),
                        None => amount,
                    })
                }
                None => json_ld_price(map.get("offers")),
            }
        }
        Some(Value::Array(items)) => items.iter().find_map(|item| json_ld_price(Some(item))),
        _ => None,
    }
}

fn offer_field(offers: Option<&Value>, key: &str, out: &mut Vec<String>) {
    match offers {
        Some(Value::Object(map)) => {
            if let Some(v) = json_ld_string(map.get(key)).filter(|v| !v.is_empty()) {
                out.push(v);
            }
            offer_field(map.get("offers"), key, out);
        }
        Some(Value::Array(items)) => {
            for item in items {
                offer_field(Some(item), key, out);
            }
        }
        _ => {}
    }
}

fn json_ld_images(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .flat_map(|item| json_ld_images(Some(item)))
            .collect(),
        Some(Value::Object(map)) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(|v| v.as_str())
            .map(|u| vec![u.trim().to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// `https://schema.org/UsedCondition` → `Used`.
fn condition_label(raw: &str) -> String {
    let tail = raw.rsplit('/').next().unwrap_or(raw);
    match tail {
        "NewCondition" => "New".to_string(),
        "UsedCondition" => "Used".to_string(),
        "RefurbishedCondition" => "Refurbished".to_string(),
        "DamagedCondition" => "Damaged".to_string(),
        other => other.trim_end_matches("Condition").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(blocks: &[&str]) -> Html {
        let scripts: String = blocks
            .iter()
            .map(|b| format!(r#"<script type="application/ld+json">{}</script>"#, b))
            .collect();
        Html::parse_document(&format!("<html><head>{}</head><body></body></html>", scripts))
    }

    #[test]
    fn test_product_matched_by_item_id() {
        let doc = page(&[
            r#"{"@type":"BreadcrumbList","itemListElement":[]}"#,
            r#"{"@context":"https://schema.org","@type":"Product","name":"Widget Pro",
                "image":["https://i.ebayimg.com/g/a/s-l500.jpg"],
                "brand":{"@type":"Brand","name":"Acme"},
                "offers":{"@type":"Offer","price":"24.99","priceCurrency":"USD",
                          "url":"https://www.ebay.com/itm/1234567890",
                          "itemCondition":"https://schema.org/UsedCondition"}}"#,
        ]);
        let p = find_product(&doc, Some("1234567890"), "https://www.ebay.com/itm/1234567890").unwrap();
        assert_eq!(p.name.as_deref(), Some("Widget Pro"));
        assert_eq!(p.price.as_deref(), Some("USD 24.99"));
        assert_eq!(p.brand.as_deref(), Some("Acme"));
        assert_eq!(p.condition.as_deref(), Some("Used"));
        assert_eq!(p.images.len(), 1);
    }

    #[test]
    fn test_other_items_product_is_ignored() {
        let doc = page(&[
            r#"[{"@type":"Product","name":"Sponsored","offers":{"price":1,"url":"https://www.ebay.com/itm/999"}}]"#,
        ]);
        assert!(find_product(&doc, Some("1234567890"), "https://www.ebay.com/itm/1234567890").is_none());
    }

    #[test]
    fn test_graph_and_page_url_match_without_id() {
        let doc = page(&[
            r#"{"@graph":[{"@type":["Product"],"name":"Gadget",
                "offers":[{"lowPrice":"10.00","url":"https://shop.test/p/gadget/"}]}]}"#,
        ]);
        let p = find_product(&doc, None, "https://shop.test/p/gadget").unwrap();
        assert_eq!(p.price.as_deref(), Some("10.00"));
        assert_eq!(p.condition, None);
    }

    #[test]
    fn test_inconsistent_candidate_rejected() {
        let doc = page(&[
            r#"{"@type":"Product","name":"","offers":{"price":"5","url":"https://www.ebay.com/itm/1"}}"#,
            r#"{"@type":"Product","name":"Bad price","offers":{"price":"call us","url":"https://www.ebay.com/itm/1"}}"#,
        ]);
        assert!(find_product(&doc, Some("1"), "https://www.ebay.com/itm/1").is_none());
    }

    #[test]
    fn test_malformed_block_skipped() {
        let doc = page(&[
            "{not json",
            r#"{"@type":"Product","name":"Ok","url":"https://www.ebay.com/itm/42"}"#,
        ]);
        let p = find_product(&doc, Some("42"), "https://www.ebay.com/itm/42").unwrap();
        assert_eq!(p.name.as_deref(), Some("Ok"));
        assert_eq!(p.price, None);
    }
}
