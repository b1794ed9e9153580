//! Collector engine: a bounded, concurrent fetch/resolve crawl loop and the
//! HTTP and filesystem collaborators that plug into it.
mod budget;
mod engine;
mod fetch;
mod filename;
mod persist;
mod progress;
mod resolve;
mod types;

pub use engine::{ConfigError, Engine, EngineConfig, EngineError};
pub use fetch::{content_kind, FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use filename::content_filename;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use progress::{ChannelProgressSink, NullProgressSink, ProgressSink};
pub use resolve::{PersistingResolver, Resolver};
pub use types::{
    Address, Content, CrawlReport, EngineEvent, FailureKind, FetchError, RejectReason,
    ResolveError, Stage, StopReason,
};
