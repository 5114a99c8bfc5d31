pub mod browser_manager;
pub mod fetcher;
pub mod stealth;

pub use browser_manager::BrowserSession;
pub use fetcher::{Fetcher, RenderedDocument};
