pub mod core;
pub mod extract;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{ConfigError, FetchError, ScoutConfig, SinkError, SiteConfig, StageError};

// --- Short module paths ---
pub use crate::features::{antibot, challenge};
pub use crate::scraping::{BrowserSession, Fetcher, RenderedDocument};
pub use crate::tools::{paginate, pipeline, product, sink, suggest, JsonLinesSink, Pipeline, RecordSink};
