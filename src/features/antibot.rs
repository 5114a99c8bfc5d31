use crate::core::config::StageDelays;
use std::time::Duration;
use tracing::debug;

/// Realistic desktop user agents, drawn once per browser session.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Get a random user agent string for stealth
pub fn get_random_user_agent() -> &'static str {
    use rand::prelude::*;
    let mut rng = rand::rng();
    let index = rng.random_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// Request delay configuration for polite scraping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDelay {
    /// Minimum delay in milliseconds between requests
    pub min_ms: u64,
    /// Maximum delay in milliseconds between requests
    pub max_ms: u64,
}

impl RequestDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Get random delay within configured range with jitter, never below `min_ms`
    /// nor above `max_ms`.
    pub fn random_delay(&self) -> u64 {
        use rand::prelude::*;
        if self.max_ms <= self.min_ms {
            return self.min_ms;
        }
        let mut rng = rand::rng();
        let base_delay = rng.random_range(self.min_ms..=self.max_ms);

        // ±20% jitter to avoid a detectable rhythm
        let jitter_range = (base_delay as f64 * 0.2) as i64;
        let jitter = if jitter_range > 0 {
            rng.random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        (base_delay as i64 + jitter).clamp(self.min_ms as i64, self.max_ms as i64) as u64
    }

    pub async fn sleep(&self) -> u64 {
        let delay = self.random_delay();
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        delay
    }
}

/// Which kind of navigation a pause precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Suggestion,
    Search,
    Product,
    /// After a page's landmarks appeared, before capture.
    Settle,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Suggestion => "suggestion",
            Stage::Search => "search",
            Stage::Product => "product",
            Stage::Settle => "settle",
        }
    }
}

/// Randomized pauses between externally-visible navigations of one session.
///
/// Each session carries its own budget; nothing here is shared across sessions.
#[derive(Debug, Clone, Copy)]
pub struct Politeness {
    suggestion: RequestDelay,
    search: RequestDelay,
    product: RequestDelay,
    settle: RequestDelay,
}

impl Politeness {
    pub fn new(delays: StageDelays) -> Self {
        Self {
            suggestion: delays.suggestion.into(),
            search: delays.search.into(),
            product: delays.product.into(),
            settle: delays.settle.into(),
        }
    }

    pub fn delay_for(&self, stage: Stage) -> RequestDelay {
        match stage {
            Stage::Suggestion => self.suggestion,
            Stage::Search => self.search,
            Stage::Product => self.product,
            Stage::Settle => self.settle,
        }
    }

    pub async fn pause(&self, stage: Stage) {
        let waited = self.delay_for(stage).sleep().await;
        if waited > 0 {
            debug!(stage = stage.as_str(), "politeness delay {}ms", waited);
        }
    }
}
