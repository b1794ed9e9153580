//! Command-line surface of the `collector` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use collector_engine::{EngineConfig, FetchSettings};
use collector_logging::LogDestination;
use log::LevelFilter;

const LOG_FILE: &str = "collector.log";

#[derive(Parser, Debug)]
#[command(
    name = "collector",
    version,
    about = "Fetch a resource, follow what it leads to, and save everything fetched",
    long_about = "collector starts from a seed URL and keeps fetching until the depth limit, \
                  the fetch limit, or the idle timeout stops it. Fetched resources are written \
                  to the output directory."
)]
pub struct Cli {
    /// URL to start from
    pub seed: String,

    /// Addresses at this depth or deeper are not fetched (the seed is depth 0)
    #[arg(long, default_value_t = 1)]
    pub max_depth: u32,

    /// Stop admitting fetches after this many successful ones
    #[arg(long, default_value_t = 100)]
    pub max_fetches: u32,

    /// Seconds a stage may sit on an empty queue before it stops
    #[arg(long, default_value_t = 10)]
    pub idle_timeout_secs: u64,

    /// Pause before each dequeue in the fetch stage, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Fetches (and resolves) allowed in flight at once
    #[arg(long, default_value_t = 16)]
    pub concurrency: usize,

    /// Capacity of the address and content queues
    #[arg(long, default_value_t = 10)]
    pub queue_capacity: usize,

    /// Directory fetched resources are written to
    #[arg(long, short, default_value = "output")]
    pub output: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 4)]
    pub request_timeout_secs: u64,

    /// Proxy URL; repeat to rotate between several
    #[arg(long = "proxy")]
    pub proxies: Vec<String>,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    /// Log at debug level
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl Cli {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_depth: self.max_depth,
            fetch_limit: self.max_fetches,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            queue_capacity: self.queue_capacity,
            max_concurrency: self.concurrency,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            proxies: self.proxies.clone(),
            ..FetchSettings::default()
        }
    }

    pub fn log_destination(&self) -> LogDestination {
        match self.log {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File(PathBuf::from(LOG_FILE)),
            LogTarget::Both => LogDestination::Both(PathBuf::from(LOG_FILE)),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
