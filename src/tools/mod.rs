//! Crawl stages and the orchestrator that sequences them.

pub mod paginate;
pub mod pipeline;
pub mod product;
pub mod session;
pub mod sink;
pub mod suggest;

pub use pipeline::Pipeline;
pub use session::StageSession;
pub use sink::{JsonLinesSink, RecordSink};
