//! The only path by which stages advance the browser.
//!
//! Every externally visible navigation goes through [`StageSession::visit`]:
//! politeness pause, navigate, challenge check, landmark wait, settle pause,
//! challenge check again on what was finally captured.

use crate::core::error::{FetchError, StageError};
use crate::features::antibot::{Politeness, Stage};
use crate::features::challenge::ChallengeDetector;
use crate::features::snapshots::DebugSnapshots;
use crate::scraping::fetcher::{Fetcher, RenderedDocument};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

pub struct StageSession<F: Fetcher> {
    fetcher: F,
    politeness: Politeness,
    detector: &'static ChallengeDetector,
    snapshots: DebugSnapshots,
    wait_timeout: Duration,
    closed: bool,
}

impl<F: Fetcher> StageSession<F> {
    pub fn new(
        fetcher: F,
        politeness: Politeness,
        snapshots: DebugSnapshots,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            politeness,
            detector: ChallengeDetector::shared(),
            snapshots,
            wait_timeout,
            closed: false,
        }
    }

    /// Pause for `stage`, navigate to `url` and wait for any of `landmarks`.
    ///
    /// A challenge page is reported as [`StageError::Challenge`] whether it is
    /// served on arrival or replaces the page while waiting.
    pub async fn visit(
        &mut self,
        stage: Stage,
        url: &str,
        landmarks: &[String],
    ) -> Result<RenderedDocument, StageError> {
        self.politeness.pause(stage).await;
        let arrived = self.fetcher.navigate(url).await?;
        self.guard(&arrived)?;
        if landmarks.is_empty() {
            return Ok(arrived);
        }
        self.await_landmarks(landmarks).await
    }

    /// Type into the current page and wait for `landmarks` (e.g. a suggestion
    /// dropdown) to appear.
    pub async fn type_and_wait(
        &mut self,
        selector: &str,
        text: &str,
        landmarks: &[String],
    ) -> Result<RenderedDocument, StageError> {
        self.fetcher.type_into(selector, text).await?;
        self.await_landmarks(landmarks).await
    }

    async fn await_landmarks(&mut self, landmarks: &[String]) -> Result<RenderedDocument, StageError> {
        match self.fetcher.wait_for(landmarks, self.wait_timeout).await {
            Ok(_) => {}
            Err(e) => {
                // A challenge interstitial never shows the landmarks; report it as such.
                if let Ok(current) = self.fetcher.wait_for(&[], Duration::ZERO).await {
                    self.guard(&current)?;
                }
                return Err(e.into());
            }
        }
        self.politeness.pause(Stage::Settle).await;
        let settled = self.fetcher.wait_for(&[], Duration::ZERO).await?;
        self.guard(&settled)?;
        Ok(settled)
    }

    fn guard(&self, doc: &RenderedDocument) -> Result<(), StageError> {
        match self.detector.classify(doc) {
            Some(signal) => Err(StageError::Challenge {
                url: doc.final_url.clone(),
                marker: signal.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The page currently loaded, without navigating.
    pub async fn current(&mut self) -> Result<RenderedDocument, FetchError> {
        self.fetcher.wait_for(&[], Duration::ZERO).await
    }

    /// Snapshot the current page under `label` when a debug dir is configured.
    pub async fn snapshot(&mut self, label: &str) -> Vec<PathBuf> {
        if !self.snapshots.is_enabled() {
            return Vec::new();
        }
        let doc = self.current().await.ok();
        self.snapshots
            .capture(label, doc.as_ref(), &mut self.fetcher)
            .await
    }

    /// Release the browser. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("closing stage session");
        self.fetcher.close().await;
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

/// Log a stage failure with the fields common to every stage.
pub(crate) fn report(stage: &str, label: &str, err: &StageError) {
    match err {
        StageError::Challenge { url, marker } => {
            warn!(stage, label, url = %url, marker = %marker, "🛡️ bot challenge detected")
        }
        StageError::Fetch(e) if e.is_timeout() => {
            warn!(stage, label, "⏱️ timed out: {}", e)
        }
        StageError::Fetch(e) => warn!(stage, label, kind = e.kind(), "fetch failed: {}", e),
    }
}
