//! Debug snapshots of pages that stopped a stage (challenge, timeout).
//!
//! Written only when `debug_dir` is configured. Failures to write are logged
//! and otherwise ignored: a snapshot never affects the crawl.

use crate::scraping::fetcher::{Fetcher, RenderedDocument};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_LABEL_LEN: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct DebugSnapshots {
    dir: Option<PathBuf>,
}

impl DebugSnapshots {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Save the page markup (when known) and a screenshot of the session's
    /// current page as `<label>_<timestamp>.{html,png}`.
    pub async fn capture(
        &self,
        label: &str,
        doc: Option<&RenderedDocument>,
        fetcher: &mut dyn Fetcher,
    ) -> Vec<PathBuf> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("snapshot dir {} unavailable: {}", dir.display(), e);
            return Vec::new();
        }

        let stem = format!(
            "{}_{}",
            sanitize_label(label),
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        );
        let mut written = Vec::new();

        if let Some(doc) = doc {
            let path = dir.join(format!("{}.html", stem));
            if write(&path, doc.body_html.as_bytes()).await {
                written.push(path);
            }
        }
        if let Some(png) = fetcher.screenshot().await {
            let path = dir.join(format!("{}.png", stem));
            if write(&path, &png).await {
                written.push(path);
            }
        }
        if !written.is_empty() {
            info!("📸 snapshot saved: {}", dir.join(&stem).display());
        }
        written
    }
}

async fn write(path: &Path, bytes: &[u8]) -> bool {
    match tokio::fs::write(path, bytes).await {
        Ok(()) => true,
        Err(e) => {
            warn!("failed to write snapshot {}: {}", path.display(), e);
            false
        }
    }
}

/// Reduce a free-form label (keyword, term, page) to a safe file stem.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_sep = true;
    for c in label.chars() {
        if c.is_alphanumeric() || c == '-' {
            out.extend(c.to_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    let trimmed: String = out.trim_matches('_').chars().take(MAX_LABEL_LEN).collect();
    if trimmed.is_empty() {
        "page".to_string()
    } else {
        trimmed
    }
}
