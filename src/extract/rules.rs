//! Declarative selector tables.
//!
//! Every field maps to an ordered list of strategies; the engine takes the
//! first one that yields a non-empty value. The built-in tables target
//! eBay-style markup and can be replaced per site through `SiteConfig.rules`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Product-page fields recovered through rules.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Price,
    Description,
    /// `src` of an out-of-line description frame.
    DescriptionFrame,
    Category,
    Condition,
    Brand,
    Location,
    ReturnsText,
    SellerName,
    SellerFeedback,
    SellerRating,
    SellerLink,
    TopRatedBadge,
    /// Identifier embedded in the page, used when the URL has none.
    ItemId,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Price => "price",
            Field::Description => "description",
            Field::DescriptionFrame => "description_frame",
            Field::Category => "category",
            Field::Condition => "condition",
            Field::Brand => "brand",
            Field::Location => "location",
            Field::ReturnsText => "returns_text",
            Field::SellerName => "seller_name",
            Field::SellerFeedback => "seller_feedback",
            Field::SellerRating => "seller_rating",
            Field::SellerLink => "seller_link",
            Field::TopRatedBadge => "top_rated_badge",
            Field::ItemId => "item_id",
        }
    }
}

/// One way of locating a value.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Text of the first match, or of every match joined by `join`.
    Text {
        css: String,
        #[serde(default)]
        join: Option<String>,
        /// Literal substrings removed from the result.
        #[serde(default)]
        strip: Vec<String>,
        /// Node texts ignored when joining (case-insensitive).
        #[serde(default)]
        skip: Vec<String>,
    },
    /// Attribute of the first match that carries it.
    Attr { css: String, attr: String },
    /// Label/value rows: value of the first row whose label is one of `keys`.
    Labeled {
        row: String,
        label: String,
        value: String,
        keys: Vec<String>,
    },
    /// `"true"` when anything matches.
    Present { css: String },
}

impl Strategy {
    pub fn text(css: &str) -> Self {
        Strategy::Text {
            css: css.to_string(),
            join: None,
            strip: Vec::new(),
            skip: Vec::new(),
        }
    }

    pub fn attr(css: &str, attr: &str) -> Self {
        Strategy::Attr {
            css: css.to_string(),
            attr: attr.to_string(),
        }
    }

    pub fn present(css: &str) -> Self {
        Strategy::Present {
            css: css.to_string(),
        }
    }

    pub fn labeled(row: &str, label: &str, value: &str, keys: &[&str]) -> Self {
        Strategy::Labeled {
            row: row.to_string(),
            label: label.to_string(),
            value: value.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Aggregate all matches with `sep`. No-op on non-text strategies.
    pub fn joined(mut self, sep: &str) -> Self {
        if let Strategy::Text { join, .. } = &mut self {
            *join = Some(sep.to_string());
        }
        self
    }

    pub fn stripping(mut self, needle: &str) -> Self {
        if let Strategy::Text { strip, .. } = &mut self {
            strip.push(needle.to_string());
        }
        self
    }

    pub fn skipping(mut self, words: &[&str]) -> Self {
        if let Strategy::Text { skip, .. } = &mut self {
            skip.extend(words.iter().map(|w| w.to_string()));
        }
        self
    }
}

/// Search-result page tables.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ListingRules {
    /// Listing-node selectors; the first one matching anything wins.
    pub containers: Vec<String>,
    pub link: Vec<Strategy>,
    pub title: Vec<Strategy>,
    pub price: Vec<Strategy>,
    pub next_page: Vec<Strategy>,
}

impl Default for ListingRules {
    fn default() -> Self {
        Self {
            containers: vec![
                "div.srp-river-results ul.srp-list > li.s-item".to_string(),
                "ul.srp-results > li.s-item".to_string(),
                "ul.srp-results > li.s-card".to_string(),
            ],
            link: vec![
                Strategy::attr("a.s-item__link", "href"),
                Strategy::attr("a.su-link", "href"),
            ],
            title: vec![
                Strategy::text("div.s-item__title span[role=\"heading\"]"),
                Strategy::text("h3.s-item__title"),
                Strategy::text("div.s-item__title"),
                Strategy::text("div.s-card__title"),
            ],
            price: vec![
                Strategy::text("span.s-item__price").joined(""),
                Strategy::text("span.s-card__price").joined(""),
            ],
            next_page: vec![
                Strategy::attr("a.pagination__next[href]", "href"),
                Strategy::attr("a[rel=\"next\"][href]", "href"),
            ],
        }
    }
}

/// How gallery image URLs are cleaned up.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ImagePolicy {
    /// Raster extensions kept (lower-case, no dot).
    pub extensions: Vec<String>,
    /// Prefix of the size token embedded in thumbnail file names.
    pub size_token_prefix: String,
    /// Token substituted for any thumbnail size.
    pub max_size_token: String,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            size_token_prefix: "s-l".to_string(),
            max_size_token: "s-l1600".to_string(),
        }
    }
}

/// Product-page tables.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ProductRules {
    pub fields: BTreeMap<Field, Vec<Strategy>>,
    /// Every image strategy contributes (union in declared order).
    pub images: Vec<Strategy>,
    pub image_policy: ImagePolicy,
    /// Lower-cased phrases in the returns section meaning free returns.
    pub free_returns_phrases: Vec<String>,
}

const SPECIFICS_ROW: &str = "div.ux-labels-values";
const SPECIFICS_LABEL: &str = "div.ux-labels-values__labels";
const SPECIFICS_VALUE: &str = "div.ux-labels-values__values span.ux-textspans";
const LEGACY_SPECIFICS_ROW: &str = "div.itemAttr table tr, table.vi-ia-tb tr";
const LEGACY_SPECIFICS_LABEL: &str = "td.attrLabels, th";
const LEGACY_SPECIFICS_VALUE: &str = "td:not(.attrLabels)";

impl Default for ProductRules {
    fn default() -> Self {
        use Field::*;

        let mut fields = BTreeMap::new();
        fields.insert(
            Title,
            vec![
                Strategy::text("h1.x-item-title__mainTitle span.ux-textspans"),
                Strategy::text("h1#itemTitle span.ux-textspans--BOLD"),
                Strategy::text("h1#itemTitle").stripping("Details about"),
            ],
        );
        fields.insert(
            Price,
            vec![
                Strategy::text("div.x-price-primary span.ux-textspans").joined(""),
                Strategy::text("span#prcIsum"),
                Strategy::text("span#mm-saleDscPrc"),
                Strategy::text("div[data-testid=\"item-price\"] span.ux-textspans"),
            ],
        );
        fields.insert(
            Description,
            vec![
                Strategy::text("div#desc_module div#ds_div"),
                Strategy::text("div#desc_div"),
                Strategy::text("div#descriptioncontent"),
                Strategy::text("div#viTabs_0_is"),
            ],
        );
        fields.insert(
            DescriptionFrame,
            vec![Strategy::attr("iframe#desc_ifr", "src")],
        );
        fields.insert(
            Category,
            vec![
                Strategy::text("nav[aria-label=\"breadcrumb\"] ol li a span")
                    .joined(" > ")
                    .skipping(&["home", "back to home page"]),
                Strategy::text("nav[aria-label=\"Breadcrumb\"] ol li a span")
                    .joined(" > ")
                    .skipping(&["home", "back to home page"]),
                Strategy::text("nav.breadcrumbs ul li a")
                    .joined(" > ")
                    .skipping(&["home"]),
            ],
        );
        fields.insert(
            Condition,
            vec![
                Strategy::text(
                    "div[data-testid=\"x-item-condition\"] div.ux-labels-values__values-content span.ux-textspans",
                )
                .joined(" "),
                Strategy::text("div.d-item-condition span.ux-textspans").joined(" "),
                Strategy::labeled(SPECIFICS_ROW, SPECIFICS_LABEL, SPECIFICS_VALUE, &["condition", "item condition"]),
            ],
        );
        fields.insert(
            Brand,
            vec![
                Strategy::labeled(SPECIFICS_ROW, SPECIFICS_LABEL, SPECIFICS_VALUE, &["brand"]),
                Strategy::labeled(LEGACY_SPECIFICS_ROW, LEGACY_SPECIFICS_LABEL, LEGACY_SPECIFICS_VALUE, &["brand"]),
            ],
        );
        fields.insert(
            Location,
            vec![
                Strategy::labeled(SPECIFICS_ROW, SPECIFICS_LABEL, SPECIFICS_VALUE, &["item location", "location"]),
                Strategy::labeled(
                    LEGACY_SPECIFICS_ROW,
                    LEGACY_SPECIFICS_LABEL,
                    LEGACY_SPECIFICS_VALUE,
                    &["item location", "location"],
                ),
                Strategy::text("div.ux-labels-values--itemLocation div.ux-labels-values__values span.ux-textspans"),
            ],
        );
        fields.insert(
            ReturnsText,
            vec![
                Strategy::text("div[data-testid=\"x-returns-section\"] span.ux-textspans").joined(" "),
                Strategy::text("div[data-testid=\"x-returns-text\"] span").joined(" "),
                Strategy::text("div.ux-labels-values--returns span.ux-textspans").joined(" "),
            ],
        );
        fields.insert(
            SellerName,
            vec![
                Strategy::text("div.x-sellercard-atf__info__about-seller a span.ux-textspans"),
                Strategy::text("div.ux-seller-section__item--seller a span.ux-textspans"),
                Strategy::text("a[data-testid=\"seller-profile-link\"] span span"),
            ],
        );
        fields.insert(
            SellerFeedback,
            vec![
                Strategy::text(
                    "div.x-sellercard-atf__info__about-seller a.ux-action[aria-label*=\"feedback score\"] span[aria-hidden=\"true\"]",
                ),
                Strategy::text("li[data-testid=\"x-sellercard-atf__about-seller\"] span.ux-textspans--SECONDARY"),
                Strategy::text("span.ux-seller-section__item--feedbackscore span.ux-textspans"),
                Strategy::text("a[data-testid=\"seller-profile-link\"] span.ux-textspans--SECONDARY"),
            ],
        );
        fields.insert(
            SellerRating,
            vec![
                Strategy::text("div.x-sellercard-atf__info__rating span.ux-textspans--PERCENTAGE"),
                Strategy::text("div.x-sellercard-atf__data-item span.ux-textspans--PSEUDOLINK"),
                Strategy::text("div.ux-seller-section__item--positive-feedback span.ux-textspans--SENTIMENT_POSITIVE"),
            ],
        );
        fields.insert(
            SellerLink,
            vec![
                Strategy::attr("div.x-sellercard-atf__info__about-seller a", "href"),
                Strategy::attr("div.ux-seller-section__item--seller a", "href"),
                Strategy::attr("a[data-testid=\"seller-profile-link\"]", "href"),
            ],
        );
        fields.insert(
            TopRatedBadge,
            vec![
                Strategy::present("span.ux-icon--TOP_RATED_PLUS_SEAL"),
                Strategy::present("span.ux-icon--TOP_RATED_PLUS_PROGRAM"),
                Strategy::present("svg[aria-label=\"Top Rated Seller\"]"),
                Strategy::present("span[title=\"Top Rated Seller\"]"),
                Strategy::present("span.ux-icon--TRS_PROGRAM_VISUAL_INDICATOR"),
            ],
        );
        fields.insert(
            ItemId,
            vec![
                Strategy::text("div.ux-layout-section__textual-display--itemId span.ux-textspans--BOLD"),
                Strategy::attr("meta[itemprop=\"productID\"]", "content"),
                Strategy::attr("[data-listing-id]", "data-listing-id"),
            ],
        );

        Self {
            fields,
            images: vec![
                Strategy::attr("div.ux-image-carousel-item img", "data-zoom-src"),
                Strategy::attr("div.ux-image-carousel-item img", "src"),
                Strategy::attr("img#icImg", "src"),
                Strategy::attr("div.img-figures-viewport ul li img", "data-zoom-src"),
                Strategy::attr("div.ux-image-filmstrip-carousel-item button img", "src"),
                Strategy::attr("div.ux-image-grid-container button img", "src"),
            ],
            image_policy: ImagePolicy::default(),
            free_returns_phrases: vec![
                "free returns".to_string(),
                "freereturns".to_string(),
                "free 30 day returns".to_string(),
            ],
        }
    }
}

/// All selector tables for a site.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SiteRules {
    pub listing: ListingRules,
    pub product: ProductRules,
}
