//! Ordered, multi-strategy field extraction over rendered markup.
//!
//! Target markup varies by locale and layout experiment, so each field carries
//! an ordered list of strategies, most specific first; the first non-empty
//! result wins. A field nothing matches stays `None`. Extraction never fails.

pub mod images;
pub mod jsonld;
pub mod rules;

use rules::{Field, Strategy};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeMap;
use tracing::debug;

/// Field values recovered from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    values: BTreeMap<Field, Option<String>>,
}

impl Extracted {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).and_then(|v| v.as_deref())
    }

    pub fn take(&mut self, field: Field) -> Option<String> {
        self.values.get_mut(&field).and_then(Option::take)
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    pub fn missing(&self) -> Vec<Field> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(f, _)| *f)
            .collect()
    }
}

/// Apply every field's strategy list to `doc`.
pub fn extract(doc: &Html, fields: &BTreeMap<Field, Vec<Strategy>>) -> Extracted {
    extract_fields(doc.root_element(), fields, |_| false)
}

/// Like [`extract`], but leaves fields for which `skip` returns true unevaluated
/// (`None`). Used when structured data already supplied them.
pub fn extract_fields(
    scope: ElementRef<'_>,
    fields: &BTreeMap<Field, Vec<Strategy>>,
    skip: impl Fn(Field) -> bool,
) -> Extracted {
    let values = fields
        .iter()
        .map(|(field, strategies)| {
            let value = if skip(*field) {
                None
            } else {
                first_match(scope, strategies)
            };
            if value.is_none() {
                debug!(field = field.as_str(), "no strategy matched");
            }
            (*field, value)
        })
        .collect();
    Extracted { values }
}

/// The first strategy yielding a non-empty value, in declared order.
pub fn first_match(scope: ElementRef<'_>, strategies: &[Strategy]) -> Option<String> {
    strategies.iter().find_map(|s| apply(scope, s))
}

/// Evaluate one strategy inside `scope`.
pub fn apply(scope: ElementRef<'_>, strategy: &Strategy) -> Option<String> {
    match strategy {
        Strategy::Text {
            css,
            join,
            strip,
            skip,
        } => {
            let sel = selector(css)?;
            let keep = |t: &String| !t.is_empty() && !skip.iter().any(|w| w.eq_ignore_ascii_case(t));
            let raw = match join {
                Some(sep) => {
                    let parts: Vec<String> = scope
                        .select(&sel)
                        .map(|el| normalize_text(&element_text(el)))
                        .filter(keep)
                        .collect();
                    parts.join(sep)
                }
                None => scope
                    .select(&sel)
                    .map(|el| normalize_text(&element_text(el)))
                    .find(keep)
                    .unwrap_or_default(),
            };
            let mut text = raw;
            for needle in strip {
                text = text.replace(needle.as_str(), "");
            }
            non_empty(normalize_text(&text))
        }
        Strategy::Attr { css, attr } => {
            let sel = selector(css)?;
            scope
                .select(&sel)
                .filter_map(|el| el.value().attr(attr))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        }
        Strategy::Labeled {
            row,
            label,
            value,
            keys,
        } => {
            let row_sel = selector(row)?;
            let label_sel = selector(label)?;
            let value_sel = selector(value)?;
            for row_el in scope.select(&row_sel) {
                let Some(label_el) = row_el.select(&label_sel).next() else {
                    continue;
                };
                let label_text = normalize_text(&element_text(label_el))
                    .replace(':', "")
                    .trim()
                    .to_lowercase();
                if !keys.iter().any(|k| k.eq_ignore_ascii_case(&label_text)) {
                    continue;
                }
                let mut parts: Vec<String> = Vec::new();
                for v in row_el.select(&value_sel) {
                    let t = normalize_text(&element_text(v));
                    if !t.is_empty() && parts.last() != Some(&t) {
                        parts.push(t);
                    }
                }
                if let Some(v) = non_empty(parts.join(" ")) {
                    return Some(v);
                }
            }
            None
        }
        Strategy::Present { css } => {
            let sel = selector(css)?;
            scope.select(&sel).next().map(|_| "true".to_string())
        }
    }
}

/// Every value a strategy yields, in document order. `Present` yields at most one.
pub fn apply_all(scope: ElementRef<'_>, strategy: &Strategy) -> Vec<String> {
    match strategy {
        Strategy::Attr { css, attr } => match selector(css) {
            Some(sel) => scope
                .select(&sel)
                .filter_map(|el| el.value().attr(attr))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            None => Vec::new(),
        },
        Strategy::Text { css, .. } if !matches!(strategy, Strategy::Text { join: Some(_), .. }) => {
            match selector(css) {
                Some(sel) => scope
                    .select(&sel)
                    .map(|el| normalize_text(&element_text(el)))
                    .filter(|t| !t.is_empty())
                    .collect(),
                None => Vec::new(),
            }
        }
        other => apply(scope, other).into_iter().collect(),
    }
}

/// Parse a selector, treating an invalid one as matching nothing.
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("skipping invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "ul", "ol", "table",
];

/// Text content of an element, without `<script>`/`<style>` bodies, with a
/// space at block boundaries so paragraphs don't run together.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                let name = e.name();
                if matches!(name, "script" | "style" | "noscript" | "template") {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push(' ');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace, trim, and decode leftover HTML entities.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    html_escape::decode_html_entities(&collapsed).trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(field: Field, strategies: Vec<Strategy>) -> BTreeMap<Field, Vec<Strategy>> {
        let mut m = BTreeMap::new();
        m.insert(field, strategies);
        m
    }

    #[test]
    fn test_first_non_empty_rule_wins_and_is_trimmed() {
        let doc = Html::parse_document(
            r#"<html><body><h2 class="b">  Widget  </h2><h2 class="c">Other</h2></body></html>"#,
        );
        let rules = fields(
            Field::Title,
            vec![Strategy::text("h1.a"), Strategy::text("h2.b"), Strategy::text("h2.c")],
        );
        let out = extract(&doc, &rules);
        assert_eq!(out.get(Field::Title), Some("Widget"));
    }

    #[test]
    fn test_whitespace_only_match_falls_through() {
        let doc = Html::parse_document(r#"<span id="a">   </span><span id="b">B</span>"#);
        let rules = fields(
            Field::Brand,
            vec![Strategy::text("span#a"), Strategy::text("span#b")],
        );
        assert_eq!(extract(&doc, &rules).get(Field::Brand), Some("B"));
    }

    #[test]
    fn test_unmatched_field_is_none() {
        let doc = Html::parse_document("<p>nothing here</p>");
        let rules = fields(
            Field::Price,
            vec![Strategy::text("div.price"), Strategy::attr("meta[itemprop=price]", "content")],
        );
        let out = extract(&doc, &rules);
        assert_eq!(out.get(Field::Price), None);
        assert_eq!(out.missing(), vec![Field::Price]);
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let doc = Html::parse_document(r#"<h1>Title</h1>"#);
        let rules = fields(
            Field::Title,
            vec![Strategy::text("h1[[broken"), Strategy::text("h1")],
        );
        assert_eq!(extract(&doc, &rules).get(Field::Title), Some("Title"));
    }

    #[test]
    fn test_joined_price_and_unescape() {
        let doc = Html::parse_document(
            r#"<div class="x-price-primary"><span class="ux-textspans">US &amp;amp; $</span><span class="ux-textspans">12.99</span></div>"#,
        );
        let rules = fields(
            Field::Price,
            vec![Strategy::text("div.x-price-primary span.ux-textspans").joined("")],
        );
        assert_eq!(extract(&doc, &rules).get(Field::Price), Some("US & $12.99"));
    }

    #[test]
    fn test_strip_and_skip() {
        let doc = Html::parse_document(
            r#"<h1 id="itemTitle">Details about  Widget Pro</h1>
               <nav class="bc"><a>Home</a><a>Electronics</a><a>Widgets</a></nav>"#,
        );
        let title = first_match(
            doc.root_element(),
            &[Strategy::text("h1#itemTitle").stripping("Details about")],
        );
        assert_eq!(title.as_deref(), Some("Widget Pro"));

        let crumbs = first_match(
            doc.root_element(),
            &[Strategy::text("nav.bc a").joined(" > ").skipping(&["home"])],
        );
        assert_eq!(crumbs.as_deref(), Some("Electronics > Widgets"));
    }

    #[test]
    fn test_labeled_rows() {
        let doc = Html::parse_document(
            r#"<div class="ux-labels-values">
                 <div class="ux-labels-values__labels"><span>Item location:</span></div>
                 <div class="ux-labels-values__values"><span class="ux-textspans">Austin, Texas</span></div>
               </div>
               <div class="ux-labels-values">
                 <div class="ux-labels-values__labels"><span>Brand</span></div>
                 <div class="ux-labels-values__values"><span class="ux-textspans">Acme</span></div>
               </div>"#,
        );
        let brand = Strategy::labeled(
            "div.ux-labels-values",
            "div.ux-labels-values__labels",
            "div.ux-labels-values__values span.ux-textspans",
            &["brand"],
        );
        let location = Strategy::labeled(
            "div.ux-labels-values",
            "div.ux-labels-values__labels",
            "div.ux-labels-values__values span.ux-textspans",
            &["item location", "location"],
        );
        assert_eq!(apply(doc.root_element(), &brand).as_deref(), Some("Acme"));
        assert_eq!(apply(doc.root_element(), &location).as_deref(), Some("Austin, Texas"));
    }

    #[test]
    fn test_script_text_is_ignored() {
        let doc = Html::parse_document(
            r#"<div id="desc"><p>Great widget.</p><script>var x = 1;</script><p>Works well.</p></div>"#,
        );
        let desc = first_match(doc.root_element(), &[Strategy::text("div#desc")]);
        assert_eq!(desc.as_deref(), Some("Great widget. Works well."));
    }

    #[test]
    fn test_present_and_attr() {
        let doc = Html::parse_document(
            r#"<span title="Top Rated Seller"></span><a class="s" href=" /usr/acme ">Acme</a>"#,
        );
        assert_eq!(
            apply(doc.root_element(), &Strategy::present("span[title=\"Top Rated Seller\"]")).as_deref(),
            Some("true")
        );
        assert_eq!(
            apply(doc.root_element(), &Strategy::attr("a.s", "href")).as_deref(),
            Some("/usr/acme")
        );
        assert!(apply(doc.root_element(), &Strategy::present("svg.badge")).is_none());
    }
}
