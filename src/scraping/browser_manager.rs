//! Native browser session using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * Building the launch config (headless or headed, stealth flags, proxy).
//! * [`BrowserSession`], the production [`Fetcher`]: one browser, one tab,
//!   strictly sequential navigation.
//!
//! Stealth model:
//! - Process-level defaults here (user-agent rotation, browser flags).
//! - JS-level hardening via [`super::stealth::STEALTH_SCRIPT`], registered to
//!   run before every document the tab loads.

use super::fetcher::{Fetcher, RenderedDocument};
use super::stealth::STEALTH_SCRIPT;
use crate::core::config::{chrome_executable_override, BrowserSettings};
use crate::core::error::FetchError;
use crate::features::antibot::{get_random_user_agent, RequestDelay};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LANDMARK_POLL: Duration = Duration::from_millis(250);

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build a `BrowserConfig` with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the automation flag;
/// the user agent is drawn once per session.
pub fn build_browser_config(exe: &str, settings: &BrowserSettings) -> Result<BrowserConfig> {
    let ua = get_random_user_agent();
    let (width, height) = (settings.window_width, settings.window_height);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .request_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !settings.headless {
        builder = builder.with_head();
    }
    if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One browser process with a single tab, exclusively owned by one pipeline.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    timeout: Duration,
    typing: RequestDelay,
}

impl BrowserSession {
    /// Launch the browser, open a blank tab and register the stealth script.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let exe = settings
            .executable
            .clone()
            .or_else(find_chrome_executable)
            .ok_or_else(|| {
                anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
            })?;

        info!(
            "🚀 Launching browser ({}, {})",
            exe,
            if settings.headless { "headless" } else { "headed" }
        );
        let config = build_browser_config(&exe, settings)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handle.abort();
                return Err(anyhow!("Failed to open tab: {}", e));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            warn!("Failed to inject stealth script: {}", e);
        }

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handle),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            typing: settings.typing_delay.into(),
        })
    }

    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Other("browser session already closed".to_string()))
    }
}

async fn capture(page: &Page) -> Result<RenderedDocument, FetchError> {
    let body_html = page.content().await.map_err(map_cdp)?;
    let final_url = page.url().await.ok().flatten().unwrap_or_default();
    let title = page.get_title().await.ok().flatten().unwrap_or_default();
    Ok(RenderedDocument::new(final_url, title, body_html))
}

async fn has_any(page: &Page, landmarks: &[String]) -> bool {
    for landmark in landmarks {
        if page.find_element(landmark.as_str()).await.is_ok() {
            return true;
        }
    }
    false
}

fn map_cdp(e: CdpError) -> FetchError {
    match e {
        CdpError::Timeout => FetchError::Timeout("browser request timed out".to_string()),
        other => FetchError::Network(other.to_string()),
    }
}

#[async_trait]
impl Fetcher for BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<RenderedDocument, FetchError> {
        debug!("🌐 Navigating to: {}", url);
        let page = self.page()?;
        match tokio::time::timeout(self.timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(map_cdp(e)),
            Err(_) => {
                return Err(FetchError::Timeout(format!(
                    "navigation to {} exceeded {}s",
                    url,
                    self.timeout.as_secs()
                )))
            }
        }
        capture(page).await
    }

    async fn wait_for(
        &mut self,
        landmarks: &[String],
        timeout: Duration,
    ) -> Result<RenderedDocument, FetchError> {
        let page = self.page()?;
        if landmarks.is_empty() {
            return capture(page).await;
        }
        let start = Instant::now();
        loop {
            if has_any(page, landmarks).await {
                return capture(page).await;
            }
            if start.elapsed() >= timeout {
                return Err(FetchError::Timeout(format!(
                    "none of [{}] appeared within {}ms",
                    landmarks.join(", "),
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(LANDMARK_POLL).await;
        }
    }

    async fn type_into(&mut self, selector: &str, text: &str) -> Result<(), FetchError> {
        let page = self.page()?;
        let element = page.find_element(selector).await.map_err(map_cdp)?;
        element.click().await.map_err(map_cdp)?;
        for ch in text.chars() {
            element.type_str(ch.to_string()).await.map_err(map_cdp)?;
            self.typing.sleep().await;
        }
        Ok(())
    }

    async fn screenshot(&mut self) -> Option<Vec<u8>> {
        let page = self.page.as_ref()?;
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        )
        .await
        .map_err(|e| warn!("screenshot capture failed: {}", e))
        .ok()
    }

    async fn close(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            let _ = browser.wait().await;
            info!("🛑 Browser session closed");
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Drop cannot await; close from a spawned task when a runtime is around.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let handler = self.handler.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            if let Some(h) = handler {
                h.abort();
            }
        });
    }
}
