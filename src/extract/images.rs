use super::rules::{ImagePolicy, Strategy};
use regex::Regex;
use scraper::ElementRef;
use std::collections::HashSet;
use url::Url;

/// Gallery images: union of every strategy's matches, resolved against
/// `base_url`, stripped of query strings, filtered to raster extensions,
/// upgraded to the largest size token and de-duplicated (first seen wins).
pub fn collect_images(
    scope: ElementRef<'_>,
    strategies: &[Strategy],
    base_url: &str,
    policy: &ImagePolicy,
) -> Vec<String> {
    let raw: Vec<String> = strategies
        .iter()
        .flat_map(|s| super::apply_all(scope, s))
        .collect();
    normalize_images(raw, base_url, policy)
}

/// Clean a list of candidate image URLs under `policy`.
pub fn normalize_images(
    raw: impl IntoIterator<Item = String>,
    base_url: &str,
    policy: &ImagePolicy,
) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let upgrader = SizeUpgrader::new(policy);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for candidate in raw {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate.starts_with("data:") {
            continue;
        }
        let absolute = match &base {
            Some(b) => match b.join(candidate) {
                Ok(u) => u,
                Err(_) => continue,
            },
            None => match Url::parse(candidate) {
                Ok(u) => u,
                Err(_) => continue,
            },
        };
        let mut cleaned = absolute;
        cleaned.set_query(None);
        cleaned.set_fragment(None);

        if !has_raster_extension(cleaned.path(), policy) {
            continue;
        }

        let url = upgrader.upgrade(cleaned.as_str());
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}

fn has_raster_extension(path: &str, policy: &ImagePolicy) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    policy
        .extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

/// Rewrites `…/<prefix><digits>.<ext>` to `…/<max token>.<ext>`.
pub struct SizeUpgrader {
    pattern: Option<Regex>,
    max_token: String,
}

impl SizeUpgrader {
    pub fn new(policy: &ImagePolicy) -> Self {
        let exts = policy
            .extensions
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = if policy.size_token_prefix.is_empty() || exts.is_empty() {
            None
        } else {
            Regex::new(&format!(
                r"(?i)^(?P<base>.*/){}\d+\.(?P<ext>{})$",
                regex::escape(&policy.size_token_prefix),
                exts
            ))
            .ok()
        };
        Self {
            pattern,
            max_token: policy.max_size_token.clone(),
        }
    }

    pub fn upgrade(&self, url: &str) -> String {
        let Some(re) = &self.pattern else {
            return url.to_string();
        };
        match re.captures(url) {
            Some(caps) => format!("{}{}.{}", &caps["base"], self.max_token, &caps["ext"]),
            None => url.to_string(),
        }
    }
}
