pub mod config;
pub mod error;
pub mod types;

pub use config::{ScoutConfig, SiteConfig};
pub use error::{ConfigError, FetchError, SinkError, StageError};
