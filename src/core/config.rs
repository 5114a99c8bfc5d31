use crate::core::error::ConfigError;
use crate::extract::rules::SiteRules;
use crate::features::antibot::RequestDelay;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (listing-scout.json) with env overrides
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "LISTING_SCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_HEADLESS: &str = "LISTING_SCOUT_HEADLESS";
pub const ENV_DEBUG_DIR: &str = "LISTING_SCOUT_DEBUG_DIR";

pub const SEARCH_TERM_PLACEHOLDER: &str = "{searchTerm}";
pub const CATEGORY_ID_PLACEHOLDER: &str = "{categoryId}";

/// Top-level config loaded from `listing-scout.json`.
#[derive(Deserialize, Clone, Debug)]
pub struct ScoutConfig {
    /// Seed keywords, processed in order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Key into `sites`. Optional when exactly one site is defined.
    #[serde(default)]
    pub site: Option<String>,
    pub sites: BTreeMap<String, SiteConfig>,
    #[serde(default)]
    pub browser: BrowserSettings,
    /// JSON-Lines output file. Stdout when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Where HTML + screenshot snapshots of failed pages go. Disabled when unset.
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
}

impl ScoutConfig {
    /// Resolve the site to crawl: explicit key → `site` field → the only site defined.
    pub fn active_site(&self, key: Option<&str>) -> Result<(String, &SiteConfig), ConfigError> {
        let key = match key.or(self.site.as_deref()) {
            Some(k) => k.to_string(),
            None if self.sites.len() == 1 => self.sites.keys().next().cloned().unwrap_or_default(),
            None => {
                return Err(ConfigError::Invalid {
                    site: String::new(),
                    message: format!(
                        "{} sites defined; choose one with `site` or --site",
                        self.sites.len()
                    ),
                })
            }
        };
        let site = self
            .sites
            .get(&key)
            .ok_or_else(|| ConfigError::UnknownSite(key.clone()))?;
        Ok((key, site))
    }

    /// Startup validation of everything the run depends on.
    pub fn validate(&self, site_key: Option<&str>) -> Result<(), ConfigError> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::NoKeywords);
        }
        let (key, site) = self.active_site(site_key)?;
        site.validate(&key)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(exe) = chrome_executable_override() {
            self.browser.executable = Some(exe);
        }
        if let Ok(v) = std::env::var(ENV_HEADLESS) {
            let v = v.trim().to_ascii_lowercase();
            if !v.is_empty() {
                self.browser.headless = !matches!(v.as_str(), "0" | "false" | "no" | "off");
            }
        }
        if let Ok(v) = std::env::var(ENV_DEBUG_DIR) {
            if !v.trim().is_empty() {
                self.debug_dir = Some(PathBuf::from(v.trim()));
            }
        }
    }
}

/// Per-site crawl settings.
#[derive(Deserialize, Clone, Debug)]
pub struct SiteConfig {
    pub base_url: String,
    pub autocomplete: AutocompleteConfig,
    /// Search URL with a `{searchTerm}` placeholder.
    pub search_url_template: String,
    /// Search URL with `{searchTerm}` and `{categoryId}`; used when a suggestion has a category.
    #[serde(default)]
    pub search_url_template_with_category: Option<String>,
    /// Case-insensitive substrings a suggestion's category name must contain. Empty = keep all.
    #[serde(default)]
    pub allowed_category_keywords: Vec<String>,
    /// Keep category-less suggestions and fall back to the bare seed keyword.
    #[serde(default)]
    pub allow_uncategorized_search: bool,
    /// Search-result page cap per query.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Query parameter carrying the page number on search URLs.
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default)]
    pub delays: StageDelays,
    #[serde(default)]
    pub landmarks: Landmarks,
    /// Selector tables. Defaults target the eBay-style markup.
    #[serde(default)]
    pub rules: SiteRules,
}

fn default_max_pages() -> u32 {
    1
}

fn default_page_param() -> String {
    "_pgn".to_string()
}

impl SiteConfig {
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            site: key.to_string(),
            message,
        };

        if url::Url::parse(&self.base_url).is_err() {
            return Err(invalid(format!("base_url '{}' is not a URL", self.base_url)));
        }
        if !self.search_url_template.contains(SEARCH_TERM_PLACEHOLDER) {
            return Err(invalid(format!(
                "search_url_template is missing {}",
                SEARCH_TERM_PLACEHOLDER
            )));
        }
        if let Some(t) = &self.search_url_template_with_category {
            if !t.contains(SEARCH_TERM_PLACEHOLDER) || !t.contains(CATEGORY_ID_PLACEHOLDER) {
                return Err(invalid(format!(
                    "search_url_template_with_category needs {} and {}",
                    SEARCH_TERM_PLACEHOLDER, CATEGORY_ID_PLACEHOLDER
                )));
            }
        }
        if self.max_pages == 0 {
            return Err(invalid("max_pages must be at least 1".to_string()));
        }
        if let AutocompleteSource::Json { endpoint } = &self.autocomplete.source {
            if !endpoint.contains(SEARCH_TERM_PLACEHOLDER) {
                return Err(invalid(format!(
                    "autocomplete endpoint is missing {}",
                    SEARCH_TERM_PLACEHOLDER
                )));
            }
        }
        Ok(())
    }

    /// Render the search URL for a term, scoped to a category when one is given
    /// and the with-category template exists.
    pub fn search_url(&self, term: &str, category_id: Option<&str>) -> String {
        let encoded = encode_term(term);
        match (category_id, &self.search_url_template_with_category) {
            (Some(id), Some(template)) => template
                .replace(SEARCH_TERM_PLACEHOLDER, &encoded)
                .replace(CATEGORY_ID_PLACEHOLDER, &encode_term(id)),
            _ => self.search_url_template.replace(SEARCH_TERM_PLACEHOLDER, &encoded),
        }
    }

    pub fn autocomplete_url(&self, endpoint: &str, keyword: &str) -> String {
        endpoint.replace(SEARCH_TERM_PLACEHOLDER, &encode_term(keyword))
    }
}

/// Form-encode a search term (spaces become `+`).
pub fn encode_term(term: &str) -> String {
    url::form_urlencoded::byte_serialize(term.trim().as_bytes()).collect()
}

#[derive(Deserialize, Clone, Debug)]
pub struct AutocompleteConfig {
    pub source: AutocompleteSource,
    #[serde(default)]
    pub parser: SuggestionParser,
}

/// Where suggestions come from.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "snake_case")]
pub enum AutocompleteSource {
    /// Type the keyword into the site's search bar and capture the dropdown.
    Dropdown {
        search_bar_selector: String,
        container_selector: String,
    },
    /// XHR-style endpoint returning JSON; `{searchTerm}` is substituted.
    Json { endpoint: String },
}

/// How captured suggestion markup / JSON is parsed.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionParser {
    /// `li[role=option]` entries with `data-value` / `data-cat-id` and a category div.
    #[default]
    EbayList,
    Json(JsonSuggestionFormat),
}

#[derive(Deserialize, Clone, Debug)]
pub struct JsonSuggestionFormat {
    /// Dot path to the suggestion array (empty = document root).
    #[serde(default)]
    pub items_path: String,
    /// Field holding the term. Plain string items are taken as the term itself.
    #[serde(default = "default_term_field")]
    pub term_field: String,
    #[serde(default)]
    pub category_name_field: Option<String>,
    #[serde(default)]
    pub category_id_field: Option<String>,
}

fn default_term_field() -> String {
    "term".to_string()
}

/// Inclusive millisecond range for a randomized pause.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }
}

impl From<DelayRange> for RequestDelay {
    fn from(r: DelayRange) -> Self {
        let (min_ms, max_ms) = if r.min_ms > r.max_ms {
            (r.max_ms, r.min_ms)
        } else {
            (r.min_ms, r.max_ms)
        };
        RequestDelay::new(min_ms, max_ms)
    }
}

/// Politeness pauses before each kind of navigation, plus a settle pause once
/// a page's landmarks have appeared.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StageDelays {
    pub suggestion: DelayRange,
    pub search: DelayRange,
    pub product: DelayRange,
    pub settle: DelayRange,
}

impl Default for StageDelays {
    fn default() -> Self {
        Self {
            suggestion: DelayRange::new(1500, 3000),
            search: DelayRange::new(2000, 4500),
            product: DelayRange::new(2500, 5500),
            settle: DelayRange::new(800, 1800),
        }
    }
}

impl StageDelays {
    /// No pauses at all (fixtures, tests).
    pub fn none() -> Self {
        Self {
            suggestion: DelayRange::none(),
            search: DelayRange::none(),
            product: DelayRange::none(),
            settle: DelayRange::none(),
        }
    }
}

/// Selectors whose presence means a page finished rendering.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Landmarks {
    pub search: Vec<String>,
    pub product: Vec<String>,
}

impl Default for Landmarks {
    fn default() -> Self {
        Self {
            search: vec![
                "ul.srp-results > li.s-item".to_string(),
                "div.srp-river-results > ul.srp-list > li.s-item".to_string(),
                ".srp-save-null-search__heading".to_string(),
                "a.pagination__next".to_string(),
            ],
            product: vec![
                "h1.x-item-title__mainTitle".to_string(),
                "h1#itemTitle".to_string(),
                "div.x-price-primary".to_string(),
                "span#prcIsum".to_string(),
                "#desc_ifr".to_string(),
            ],
        }
    }
}

/// Browser session settings.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// e.g. `socks5://127.0.0.1:9150`.
    pub proxy: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    /// Upper bound for a navigation or a landmark wait.
    pub timeout_secs: u64,
    /// Explicit browser binary; auto-discovered when unset.
    pub executable: Option<String>,
    /// Pause between keystrokes when typing into the search bar.
    pub typing_delay: DelayRange,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            window_width: 1920,
            window_height: 1080,
            timeout_secs: 25,
            executable: None,
            typing_delay: DelayRange::new(50, 200),
        }
    }
}

/// Load `listing-scout.json`.
///
/// Search order (first found wins):
/// 1. `explicit` path (from `--config`)
/// 2. `LISTING_SCOUT_CONFIG` env var path
/// 3. `./listing-scout.json`
/// 4. `../listing-scout.json`
/// 5. `~/.listing-scout/listing-scout.json`
///
/// Unlike optional feature config, a missing or unparsable file is fatal.
pub fn load_config(explicit: Option<&Path>) -> Result<ScoutConfig, ConfigError> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(p) => vec![p.to_path_buf()],
        None => {
            let mut v = Vec::new();
            if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
                v.push(PathBuf::from(env_path));
            }
            v.push(PathBuf::from("listing-scout.json"));
            v.push(PathBuf::from("../listing-scout.json"));
            if let Some(home) = dirs::home_dir() {
                v.push(home.join(".listing-scout").join("listing-scout.json"));
            }
            v
        }
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut cfg = parse_config(&contents, path)?;
                cfg.apply_env_overrides();
                tracing::info!("listing-scout.json loaded from {}", path.display());
                return Ok(cfg);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }

    Err(ConfigError::NotFound(
        candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    ))
}

pub fn parse_config(contents: &str, path: &Path) -> Result<ScoutConfig, ConfigError> {
    serde_json::from_str::<ScoutConfig>(contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "keywords": ["widget", "gadget"],
        "sites": {
            "ebay_us": {
                "base_url": "https://www.ebay.com",
                "autocomplete": {
                    "source": { "dropdown": {
                        "search_bar_selector": "input#gh-ac",
                        "container_selector": "ul#ui-autocomplete"
                    } },
                    "parser": "ebay_list"
                },
                "search_url_template": "https://www.ebay.com/sch/i.html?_nkw={searchTerm}",
                "search_url_template_with_category": "https://www.ebay.com/sch/i.html?_nkw={searchTerm}&_sacat={categoryId}",
                "allowed_category_keywords": ["Electronics"],
                "max_pages": 3
            }
        }
    }"#;

    fn sample() -> ScoutConfig {
        parse_config(SAMPLE, Path::new("sample.json")).unwrap()
    }

    #[test]
    fn test_parse_and_defaults() {
        let cfg = sample();
        let (key, site) = cfg.active_site(None).unwrap();
        assert_eq!(key, "ebay_us");
        assert_eq!(site.max_pages, 3);
        assert_eq!(site.page_param, "_pgn");
        assert!(!site.allow_uncategorized_search);
        assert!(matches!(site.autocomplete.parser, SuggestionParser::EbayList));
        assert!(cfg.browser.headless);
        assert_eq!(cfg.browser.timeout_secs, 25);
        assert!(cfg.validate(None).is_ok());
    }

    #[test]
    fn test_search_url_rendering() {
        let cfg = sample();
        let (_, site) = cfg.active_site(None).unwrap();
        assert_eq!(
            site.search_url("red widget", None),
            "https://www.ebay.com/sch/i.html?_nkw=red+widget"
        );
        assert_eq!(
            site.search_url("red widget", Some("293")),
            "https://www.ebay.com/sch/i.html?_nkw=red+widget&_sacat=293"
        );
    }

    #[test]
    fn test_missing_placeholder_is_fatal() {
        let cfg = sample();
        let mut site = cfg.sites["ebay_us"].clone();
        site.search_url_template = "https://www.ebay.com/sch/i.html".to_string();
        let err = site.validate("ebay_us").unwrap_err();
        assert!(err.to_string().contains("{searchTerm}"));
    }

    #[test]
    fn test_unknown_site_and_empty_keywords() {
        let mut cfg = sample();
        assert!(matches!(
            cfg.active_site(Some("ebay_uk")),
            Err(ConfigError::UnknownSite(_))
        ));
        cfg.keywords = vec!["  ".to_string()];
        assert!(matches!(cfg.validate(None), Err(ConfigError::NoKeywords)));
    }

    #[test]
    fn test_inverted_delay_range_is_normalized() {
        let delay: RequestDelay = DelayRange::new(900, 100).into();
        assert_eq!(delay.min_ms, 100);
        assert_eq!(delay.max_ms, 900);
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg = parse_config(
            include_str!("../../listing-scout.example.json"),
            Path::new("listing-scout.example.json"),
        )
        .unwrap();
        assert!(cfg.validate(None).is_ok());
        let (_, site) = cfg.active_site(None).unwrap();
        assert!(site.allow_uncategorized_search);
        assert_eq!(site.delays, StageDelays::default());
    }

    #[test]
    fn test_missing_explicit_file() {
        let path = std::env::temp_dir().join(format!("missing-{}.json", uuid::Uuid::new_v4()));
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }
}
