//! Seed keyword → concrete search queries via the site's autocomplete.

use super::session::{report, StageSession};
use crate::core::config::{AutocompleteSource, JsonSuggestionFormat, SiteConfig, SuggestionParser};
use crate::core::error::StageError;
use crate::core::types::SearchQuery;
use crate::extract::{element_text, normalize_text, selector};
use crate::features::antibot::Stage;
use crate::scraping::fetcher::{Fetcher, RenderedDocument};
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Category label of a query that searches every category.
pub const ALL_CATEGORIES: &str = "All Categories";

/// One autocomplete entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub term: String,
    pub category_name: Option<String>,
    pub category_id: Option<String>,
}

impl Suggestion {
    pub fn plain(term: &str) -> Self {
        Self {
            term: term.to_string(),
            category_name: None,
            category_id: None,
        }
    }

    pub fn in_category(term: &str, name: &str, id: &str) -> Self {
        Self {
            term: term.to_string(),
            category_name: Some(name.to_string()),
            category_id: Some(id.to_string()),
        }
    }

    /// A suggestion is scoped only when both the category name and id are known.
    pub fn has_category(&self) -> bool {
        self.category_name.is_some() && self.category_id.is_some()
    }
}

/// Outcome of resolving one seed keyword.
#[derive(Debug, Default)]
pub struct Resolution {
    pub queries: Vec<SearchQuery>,
    /// Set when a bot challenge stopped the keyword; `queries` is then empty.
    pub aborted: Option<StageError>,
}

impl Resolution {
    fn aborted(err: StageError) -> Self {
        Self {
            queries: Vec::new(),
            aborted: Some(err),
        }
    }
}

/// Expand `seed` into search queries.
///
/// Only a challenge aborts the keyword. Any other autocomplete failure counts
/// as "no suggestions", so the uncategorized fallback still applies.
pub async fn resolve<F: Fetcher>(
    session: &mut StageSession<F>,
    seed: &str,
    site: &SiteConfig,
) -> Resolution {
    let seed = seed.trim();
    let label = format!("suggest_{}", seed);

    let raw = match fetch_suggestions(session, seed, site).await {
        Ok(raw) => raw,
        Err(err) if err.is_challenge() => {
            report("suggestion", seed, &err);
            session.snapshot(&format!("challenge_{}", label)).await;
            return Resolution::aborted(err);
        }
        Err(err) => {
            report("suggestion", seed, &err);
            session.snapshot(&format!("error_{}", label)).await;
            None
        }
    };

    let parsed = match raw {
        Some(raw) => match parse_suggestions(&site.autocomplete.parser, &raw) {
            Ok(list) => list,
            Err(e) => {
                warn!(keyword = seed, "could not parse autocomplete payload: {}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    info!(keyword = seed, "found {} suggestions", parsed.len());

    let survivors = filter_suggestions(parsed, site);
    Resolution {
        queries: build_queries(seed, survivors, site),
        aborted: None,
    }
}

/// Raw autocomplete payload (dropdown markup or JSON text), `None` when the
/// surface produced nothing usable.
async fn fetch_suggestions<F: Fetcher>(
    session: &mut StageSession<F>,
    seed: &str,
    site: &SiteConfig,
) -> Result<Option<String>, StageError> {
    match &site.autocomplete.source {
        AutocompleteSource::Dropdown {
            search_bar_selector,
            container_selector,
        } => {
            session
                .visit(
                    Stage::Suggestion,
                    &site.base_url,
                    std::slice::from_ref(search_bar_selector),
                )
                .await?;
            let doc = session
                .type_and_wait(
                    search_bar_selector,
                    seed,
                    std::slice::from_ref(container_selector),
                )
                .await?;
            Ok(container_markup(&doc, container_selector))
        }
        AutocompleteSource::Json { endpoint } => {
            // Session/cookie context first; a failure here is not fatal on its own.
            match session.visit(Stage::Suggestion, &site.base_url, &[]).await {
                Ok(_) => {}
                Err(e) if e.is_challenge() => return Err(e),
                Err(e) => warn!(keyword = seed, "initial visit to {} failed: {}", site.base_url, e),
            }
            let url = site.autocomplete_url(endpoint, seed);
            debug!(keyword = seed, url = %url, "fetching autocomplete endpoint");
            let doc = session.visit(Stage::Suggestion, &url, &[]).await?;
            Ok(json_payload(&doc))
        }
    }
}

fn container_markup(doc: &RenderedDocument, container: &str) -> Option<String> {
    let html = doc.parse();
    let sel = selector(container)?;
    let el = html.select(&sel).next()?;
    Some(el.html())
}

/// Browsers wrap a bare JSON response in `<pre>`; take the text back out.
fn json_payload(doc: &RenderedDocument) -> Option<String> {
    let raw = doc.body_html.trim();
    if raw.starts_with('{') || raw.starts_with('[') {
        return Some(raw.to_string());
    }
    let html = doc.parse();
    for css in ["pre", "body"] {
        let Some(sel) = selector(css) else {
            continue;
        };
        let Some(el) = html.select(&sel).next() else {
            continue;
        };
        let text = el.text().collect::<String>();
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }
    None
}

/// Parse a captured payload with the configured parser. Entries without a
/// term are dropped.
pub fn parse_suggestions(
    parser: &SuggestionParser,
    raw: &str,
) -> Result<Vec<Suggestion>, serde_json::Error> {
    match parser {
        SuggestionParser::EbayList => Ok(parse_ebay_list(raw)),
        SuggestionParser::Json(format) => parse_json(format, raw),
    }
}

/// `li[role=option]` entries: term from `data-value` (else the visible spans
/// minus the category line), category from `div.ebay-autocomplete-cat`
/// ("in Cell Phones" → "Cell Phones") and `data-cat-id`.
pub fn parse_ebay_list(markup: &str) -> Vec<Suggestion> {
    let fragment = Html::parse_fragment(markup);
    let (Some(option), Some(cat_sel), Some(span_sel)) = (
        selector("li[role=\"option\"]"),
        selector("div.ebay-autocomplete-cat"),
        selector("span.ebayui-ellipsis-3, span[class*=\"gh-ac\"]"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for li in fragment.select(&option) {
        let cat_text = li
            .select(&cat_sel)
            .next()
            .map(|el| normalize_text(&element_text(el)))
            .filter(|t| !t.is_empty());

        let term = attr(li, "data-value").or_else(|| {
            let parts: Vec<String> = li
                .select(&span_sel)
                .map(|s| normalize_text(&element_text(s)))
                .filter(|p| !p.is_empty() && Some(p) != cat_text.as_ref())
                .collect();
            if parts.is_empty() {
                Some(normalize_text(&element_text(li)))
            } else {
                Some(parts.join(" "))
            }
        });
        let Some(term) = term.filter(|t| !t.is_empty()) else {
            continue;
        };

        let category_name = cat_text
            .map(|c| {
                if c.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("in ")) {
                    c[3..].trim().to_string()
                } else {
                    c
                }
            })
            .filter(|c| !c.is_empty());

        out.push(Suggestion {
            term,
            category_name,
            category_id: attr(li, "data-cat-id"),
        });
    }
    out
}

fn attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(normalize_text)
        .filter(|v| !v.is_empty())
}

fn parse_json(format: &JsonSuggestionFormat, raw: &str) -> Result<Vec<Suggestion>, serde_json::Error> {
    let root: Value = serde_json::from_str(raw)?;
    let items = match extract_path(&root, &format.items_path) {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    };

    let mut out = Vec::new();
    for item in items {
        let term = match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) => scalar(extract_path(item, &format.term_field)),
            _ => None,
        };
        let Some(term) = term.filter(|t| !t.is_empty()) else {
            continue;
        };
        let field = |path: &Option<String>| {
            path.as_deref()
                .and_then(|p| scalar(extract_path(item, p)))
                .filter(|v| !v.is_empty())
        };
        out.push(Suggestion {
            term,
            category_name: field(&format.category_name_field),
            category_id: field(&format.category_id_field),
        });
    }
    Ok(out)
}

/// Walk a dotted path (`res.sug`, `items.0`) through a JSON value.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&Value::Null),
                Err(_) => &Value::Null,
            },
            _ => &Value::Null,
        };
    }
    current
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Apply the category allow-list and the uncategorized policy, then collapse
/// duplicates (same term and category id), keeping first-seen order.
pub fn filter_suggestions(suggestions: Vec<Suggestion>, site: &SiteConfig) -> Vec<Suggestion> {
    let allowed: Vec<String> = site
        .allowed_category_keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for s in suggestions {
        let keep = if s.has_category() {
            let name = s.category_name.as_deref().unwrap_or_default().to_lowercase();
            allowed.is_empty() || allowed.iter().any(|k| name.contains(k.as_str()))
        } else {
            site.allow_uncategorized_search
        };
        if !keep {
            debug!(term = %s.term, category = ?s.category_name, "discarding suggestion");
            continue;
        }
        if seen.insert((s.term.clone(), s.category_id.clone())) {
            out.push(s);
        }
    }
    out
}

/// One query per survivor; with none, the bare seed when uncategorized search
/// is allowed. Uncategorized queries are labelled [`ALL_CATEGORIES`] and use
/// the plain search template.
pub fn build_queries(seed: &str, survivors: Vec<Suggestion>, site: &SiteConfig) -> Vec<SearchQuery> {
    let survivors = if survivors.is_empty() && site.allow_uncategorized_search && !seed.is_empty() {
        info!(keyword = seed, "no usable suggestions; searching the keyword itself");
        vec![Suggestion::plain(seed)]
    } else {
        survivors
    };

    survivors
        .into_iter()
        .map(|s| {
            let (category_name, category_id) = if s.has_category() {
                (s.category_name, s.category_id)
            } else {
                (Some(ALL_CATEGORIES.to_string()), None)
            };
            SearchQuery {
                search_url: site.search_url(&s.term, category_id.as_deref()),
                search_term: s.term,
                category_id,
                category_name,
                source_keyword: seed.to_string(),
            }
        })
        .collect()
}
