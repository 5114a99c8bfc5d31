//! Bot-challenge interstitial detection.
//!
//! Runs after every navigation, so it is kept to plain substring scanning over
//! three independent signals: page title, final URL, and body text.
//!
//! Title and URL markers only count as whole words: "distil" flags
//! "Distil Networks" but not a "Whiskey Distiller" listing. URL markers are
//! matched against host and path; the query string carries the shopper's
//! search terms and is never inspected.

use crate::scraping::fetcher::RenderedDocument;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use std::sync::OnceLock;
use url::Url;

const TITLE_MARKERS: &[&str] = &[
    "pardon our interruption",
    "access denied",
    "are you a human",
    "checking your browser",
    "distil",
    "incapsula",
    "akamai",
];

const URL_MARKERS: &[&str] = &["challenge", "captcha", "distil_", "incap_"];

/// Body phrases only count in pairs: "reference id:" alone shows up on
/// legitimate order and support pages.
const BODY_MARKER_PAIRS: &[(&str, &str)] = &[("reference id:", "checking your browser")];

/// Which signal flagged the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Title,
    Url,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSignal {
    pub source: SignalSource,
    pub marker: String,
}

impl std::fmt::Display for ChallengeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            SignalSource::Title => "title",
            SignalSource::Url => "url",
            SignalSource::Body => "body",
        };
        write!(f, "{} contains '{}'", source, self.marker)
    }
}

pub struct ChallengeDetector {
    title: AhoCorasick,
    url: AhoCorasick,
    body_pairs: Vec<(AhoCorasick, String)>,
    title_markers: Vec<String>,
    url_markers: Vec<String>,
}

impl std::fmt::Debug for ChallengeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeDetector")
            .field("title_markers", &self.title_markers)
            .field("url_markers", &self.url_markers)
            .field("body_pairs", &self.body_pairs.len())
            .finish()
    }
}

fn matcher<I, P>(patterns: I) -> AhoCorasick
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(patterns)
        .expect("valid challenge patterns")
}

impl ChallengeDetector {
    pub fn new(title: &[&str], url: &[&str], body_pairs: &[(&str, &str)]) -> Self {
        Self {
            title: matcher(title),
            url: matcher(url),
            body_pairs: body_pairs
                .iter()
                .map(|(a, b)| (matcher([*a, *b]), format!("{} + {}", a, b)))
                .collect(),
            title_markers: title.iter().map(|s| s.to_string()).collect(),
            url_markers: url.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Process-wide detector with the built-in marker sets.
    pub fn shared() -> &'static ChallengeDetector {
        static DETECTOR: OnceLock<ChallengeDetector> = OnceLock::new();
        DETECTOR.get_or_init(|| ChallengeDetector::new(TITLE_MARKERS, URL_MARKERS, BODY_MARKER_PAIRS))
    }

    pub fn is_challenge(&self, doc: &RenderedDocument) -> bool {
        self.classify(doc).is_some()
    }

    /// The first signal that fires, checked title → URL → body.
    pub fn classify(&self, doc: &RenderedDocument) -> Option<ChallengeSignal> {
        if let Some(i) = find_word(&self.title, &self.title_markers, &doc.title) {
            return Some(ChallengeSignal {
                source: SignalSource::Title,
                marker: self.title_markers[i].clone(),
            });
        }
        let location = host_and_path(&doc.final_url);
        if let Some(i) = find_word(&self.url, &self.url_markers, &location) {
            return Some(ChallengeSignal {
                source: SignalSource::Url,
                marker: self.url_markers[i].clone(),
            });
        }
        for (pair, label) in &self.body_pairs {
            let mut seen = [false; 2];
            for m in pair.find_iter(&doc.body_html) {
                seen[m.pattern().as_usize()] = true;
                if seen[0] && seen[1] {
                    return Some(ChallengeSignal {
                        source: SignalSource::Body,
                        marker: label.clone(),
                    });
                }
            }
        }
        None
    }
}

/// Index of the first marker found in `haystack` as a whole word. A marker
/// edge that is itself punctuation (`distil_`) needs no boundary on that side.
fn find_word(matcher: &AhoCorasick, markers: &[String], haystack: &str) -> Option<usize> {
    matcher.find_overlapping_iter(haystack).find_map(|m| {
        let marker = &markers[m.pattern().as_usize()];
        let starts_word = marker.chars().next().is_some_and(is_word_char);
        let ends_word = marker.chars().last().is_some_and(is_word_char);
        let before = haystack[..m.start()].chars().next_back();
        let after = haystack[m.end()..].chars().next();
        let open = !starts_word || !before.is_some_and(is_word_char);
        let close = !ends_word || !after.is_some_and(is_word_char);
        (open && close).then(|| m.pattern().as_usize())
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-'
}

/// `host/path` of a URL, or everything before `?`/`#` when it does not parse.
fn host_and_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new(TITLE_MARKERS, URL_MARKERS, BODY_MARKER_PAIRS)
    }
}
