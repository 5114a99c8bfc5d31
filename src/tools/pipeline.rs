//! keyword → suggestions → search pages → product pages → sink.
//!
//! One pipeline owns one session; navigation is strictly sequential. A
//! failure ends only the smallest unit around it (product, query pagination,
//! keyword); the run always drains every keyword unless the sink fails.

use super::paginate::Paginator;
use super::product::{visit_product, ProductOutcome};
use super::session::StageSession;
use super::sink::RecordSink;
use super::suggest;
use crate::core::config::{ScoutConfig, SiteConfig};
use crate::core::error::{ConfigError, SinkError};
use crate::core::types::{ListingStub, RunSummary, SearchQuery};
use crate::features::antibot::Politeness;
use crate::features::snapshots::DebugSnapshots;
use crate::scraping::fetcher::Fetcher;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct Pipeline<F: Fetcher> {
    session: StageSession<F>,
    site: SiteConfig,
    summary: RunSummary,
    run_id: Uuid,
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(session: StageSession<F>, site: SiteConfig) -> Self {
        Self {
            session,
            site,
            summary: RunSummary::default(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Wire a fetcher to the active site of `config`.
    pub fn from_config(
        fetcher: F,
        config: &ScoutConfig,
        site_key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let (key, site) = config.active_site(site_key)?;
        site.validate(&key)?;
        let session = StageSession::new(
            fetcher,
            Politeness::new(site.delays),
            DebugSnapshots::new(config.debug_dir.clone()),
            Duration::from_secs(config.browser.timeout_secs.max(1)),
        );
        Ok(Self::new(session, site.clone()))
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn session(&self) -> &StageSession<F> {
        &self.session
    }

    /// Process every keyword in order. Leaves the session open.
    pub async fn run(
        &mut self,
        keywords: &[String],
        sink: &mut dyn RecordSink,
    ) -> Result<RunSummary, SinkError> {
        info!(run_id = %self.run_id, "starting run over {} keywords", keywords.len());
        for seed in keywords {
            let seed = seed.trim();
            if seed.is_empty() {
                continue;
            }
            self.summary.keywords += 1;
            let span = info_span!("keyword", keyword = seed);
            self.process_keyword(seed, sink).instrument(span).await?;
        }
        sink.finish().await?;
        Ok(self.summary.clone())
    }

    /// Run until done or until `shutdown` resolves, then close the session
    /// whatever happened.
    pub async fn run_until(
        mut self,
        keywords: &[String],
        sink: &mut dyn RecordSink,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunSummary, SinkError> {
        let outcome = tokio::select! {
            res = self.run(keywords, sink) => Some(res),
            _ = shutdown => None,
        };

        let result = match outcome {
            Some(res) => res,
            None => {
                warn!(run_id = %self.run_id, "🛑 shutdown requested; stopping run");
                self.summary.interrupted = true;
                if let Err(e) = sink.finish().await {
                    warn!("failed to flush sink on shutdown: {}", e);
                }
                Ok(self.summary.clone())
            }
        };

        self.session.close().await;
        let s = &self.summary;
        info!(
            run_id = %self.run_id,
            keywords = s.keywords,
            keywords_aborted = s.keywords_aborted,
            queries = s.queries,
            search_pages = s.search_pages,
            products_visited = s.products_visited,
            records = s.records,
            interrupted = s.interrupted,
            "✅ run finished"
        );
        result
    }

    pub async fn process_keyword(
        &mut self,
        seed: &str,
        sink: &mut dyn RecordSink,
    ) -> Result<(), SinkError> {
        info!("🔍 resolving keyword");
        let resolution = suggest::resolve(&mut self.session, seed, &self.site).await;
        if let Some(err) = resolution.aborted {
            self.summary.keywords_aborted += 1;
            warn!("keyword aborted: {}", err);
            return Ok(());
        }
        if resolution.queries.is_empty() {
            info!("no search queries for keyword");
        }

        for query in resolution.queries {
            self.summary.queries += 1;
            let span = info_span!("query", term = %query.search_term);
            self.process_query(Arc::new(query), sink).instrument(span).await?;
        }
        Ok(())
    }

    async fn process_query(
        &mut self,
        query: Arc<SearchQuery>,
        sink: &mut dyn RecordSink,
    ) -> Result<(), SinkError> {
        let mut paginator = Paginator::new(query, &self.site);
        while let Some(page) = paginator.advance(&mut self.session, &self.site).await {
            self.summary.search_pages += 1;
            for stub in &page.stubs {
                self.process_stub(stub, sink).await?;
            }
        }
        if paginator.is_aborted() {
            self.summary.paginations_aborted += 1;
        }
        debug!(
            state = paginator.state().name(),
            fetches = paginator.fetches(),
            "pagination finished"
        );
        Ok(())
    }

    async fn process_stub(
        &mut self,
        stub: &ListingStub,
        sink: &mut dyn RecordSink,
    ) -> Result<(), SinkError> {
        self.summary.products_visited += 1;
        match visit_product(&mut self.session, stub, &self.site).await {
            ProductOutcome::Record(record) => {
                sink.write(&record).await?;
                self.summary.records += 1;
            }
            ProductOutcome::Challenge(_) | ProductOutcome::Failed(_) => {
                self.summary.products_skipped += 1;
            }
        }
        Ok(())
    }

    /// Release the session without running.
    pub async fn close(&mut self) {
        self.session.close().await;
    }
}
