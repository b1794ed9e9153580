//! The crawl loop: a fetch stage and a resolve stage joined by two bounded
//! queues.
//!
//! ```text
//! seed -> [address queue] -> fetch stage -> [content queue] -> resolve stage
//!               ^                                                   |
//!               +---------------- zero or one address --------------+
//! ```
//!
//! Each stage owns the receiving end of its input queue and spawns one unit
//! per item, gated by a semaphore. A stage stops when its queue stays empty
//! for the idle timeout, or when every producer for it is gone. Stopping drops
//! the receiver, so producers still holding an item abandon it instead of
//! blocking on a queue nobody reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use collector_logging::{collector_debug, collector_info, collector_warn};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

use crate::budget::FetchBudget;
use crate::fetch::Fetcher;
use crate::progress::{NullProgressSink, ProgressSink};
use crate::resolve::Resolver;
use crate::{Address, Content, CrawlReport, EngineEvent, RejectReason, Stage, StopReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Addresses at this depth or deeper are never fetched.
    pub max_depth: u32,
    /// Ceiling on successful fetches over the whole run.
    pub fetch_limit: u32,
    /// How long a stage waits on an empty queue before it stops.
    pub idle_timeout: Duration,
    /// Pause before each address dequeue in the fetch stage.
    pub poll_interval: Duration,
    /// Capacity of each of the two queues.
    pub queue_capacity: usize,
    /// Collaborator calls allowed in flight per stage.
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            fetch_limit: 100,
            idle_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            queue_capacity: 10,
            max_concurrency: 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue capacity must be greater than 0")]
    ZeroQueueCapacity,
    #[error("max concurrency must be greater than 0")]
    ZeroConcurrency,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

pub struct Engine {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn Resolver>,
    sink: Arc<dyn ProgressSink>,
    address_tx: mpsc::Sender<Address>,
    address_rx: mpsc::Receiver<Address>,
    content_tx: mpsc::Sender<Content>,
    content_rx: mpsc::Receiver<Content>,
}

impl Engine {
    /// Creates an engine with `seed` already queued at depth 0.
    pub fn new(
        seed: impl Into<String>,
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (address_tx, address_rx) = mpsc::channel(config.queue_capacity);
        let (content_tx, content_rx) = mpsc::channel(config.queue_capacity);
        // A fresh channel with validated non-zero capacity always has room
        // for the seed, so a full queue here means a zero capacity slipped by.
        address_tx
            .try_send(Address::seed(seed))
            .map_err(|_| ConfigError::ZeroQueueCapacity)?;

        Ok(Self {
            config,
            fetcher,
            resolver,
            sink: Arc::new(NullProgressSink),
            address_tx,
            address_rx,
            content_tx,
            content_rx,
        })
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs both stages on the current tokio runtime.
    ///
    /// Returns once both stages have stopped and every spawned unit finished.
    pub async fn start(self) -> CrawlReport {
        let Engine {
            config,
            fetcher,
            resolver,
            sink,
            address_tx,
            address_rx,
            content_tx,
            content_rx,
        } = self;

        collector_info!(
            "Starting crawl: max_depth={} fetch_limit={} idle_timeout={:?} concurrency={}",
            config.max_depth,
            config.fetch_limit,
            config.idle_timeout,
            config.max_concurrency
        );

        let tracker = TaskTracker::new();
        let shared = Arc::new(Shared {
            budget: FetchBudget::new(config.fetch_limit),
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrency)),
            resolve_permits: Arc::new(Semaphore::new(config.max_concurrency)),
            counters: Counters::default(),
            tracker: tracker.clone(),
            config,
            fetcher,
            resolver,
            sink,
        });

        tracker.spawn(run_fetch_stage(shared.clone(), address_rx, content_tx));
        tracker.spawn(run_resolve_stage(shared.clone(), content_rx, address_tx));
        tracker.close();
        tracker.wait().await;

        let report = shared.report();
        collector_info!("Crawl finished: {:?}", report);
        report
    }

    /// Runs the crawl to completion on a dedicated runtime, blocking the caller.
    pub fn run_blocking(self) -> Result<CrawlReport, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.start()))
    }
}

struct Shared {
    config: EngineConfig,
    budget: FetchBudget,
    fetch_permits: Arc<Semaphore>,
    resolve_permits: Arc<Semaphore>,
    counters: Counters,
    tracker: TaskTracker,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn Resolver>,
    sink: Arc<dyn ProgressSink>,
}

#[derive(Debug, Default)]
struct Counters {
    fetch_failures: AtomicU64,
    rejected_depth: AtomicU64,
    rejected_limit: AtomicU64,
    resolved: AtomicU64,
    terminal: AtomicU64,
    resolve_failures: AtomicU64,
    dropped_contents: AtomicU64,
    dropped_addresses: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Shared {
    /// Admission control. On success a fetch slot is held by the caller.
    fn admit(&self, address: &Address) -> Result<(), RejectReason> {
        if address.depth >= self.config.max_depth {
            return Err(RejectReason::DepthLimit {
                max_depth: self.config.max_depth,
            });
        }
        if !self.budget.try_reserve() {
            return Err(RejectReason::FetchLimit {
                fetch_limit: self.budget.limit(),
            });
        }
        Ok(())
    }

    fn reject(&self, address: Address, reason: RejectReason) {
        match reason {
            RejectReason::DepthLimit { .. } => bump(&self.counters.rejected_depth),
            RejectReason::FetchLimit { .. } => bump(&self.counters.rejected_limit),
        }
        collector_debug!(
            "Rejected {} at depth {}: {:?}",
            address.location,
            address.depth,
            reason
        );
        self.sink.emit(EngineEvent::Rejected { address, reason });
    }

    fn dropped(&self, stage: Stage) {
        match stage {
            Stage::Fetch => bump(&self.counters.dropped_addresses),
            Stage::Resolve => bump(&self.counters.dropped_contents),
        }
        self.sink.emit(EngineEvent::Dropped { stage });
    }

    fn stage_stopped(&self, stage: Stage, reason: StopReason) {
        match reason {
            StopReason::IdleTimeout => collector_info!(
                "{:?} stage idle for {:?}, stopping",
                stage,
                self.config.idle_timeout
            ),
            StopReason::UpstreamClosed => {
                collector_info!("{:?} stage input closed, stopping", stage)
            }
        }
        self.sink.emit(EngineEvent::StageStopped { stage, reason });
    }

    fn report(&self) -> CrawlReport {
        let c = &self.counters;
        CrawlReport {
            fetched: self.budget.used(),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
            rejected_depth: c.rejected_depth.load(Ordering::Relaxed),
            rejected_limit: c.rejected_limit.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            terminal: c.terminal.load(Ordering::Relaxed),
            resolve_failures: c.resolve_failures.load(Ordering::Relaxed),
            dropped_contents: c.dropped_contents.load(Ordering::Relaxed),
            dropped_addresses: c.dropped_addresses.load(Ordering::Relaxed),
        }
    }
}

/// Waits up to `idle_timeout` for the next item.
async fn next_item<T>(queue: &mut mpsc::Receiver<T>, idle_timeout: Duration) -> Result<T, StopReason> {
    match tokio::time::timeout(idle_timeout, queue.recv()).await {
        Ok(Some(item)) => Ok(item),
        Ok(None) => Err(StopReason::UpstreamClosed),
        Err(_) => Err(StopReason::IdleTimeout),
    }
}

async fn run_fetch_stage(
    shared: Arc<Shared>,
    mut addresses: mpsc::Receiver<Address>,
    contents: mpsc::Sender<Content>,
) {
    let reason = loop {
        if !shared.config.poll_interval.is_zero() {
            tokio::time::sleep(shared.config.poll_interval).await;
        }
        let address = match next_item(&mut addresses, shared.config.idle_timeout).await {
            Ok(address) => address,
            Err(reason) => break reason,
        };
        if let Err(reason) = shared.admit(&address) {
            shared.reject(address, reason);
            continue;
        }

        let permit = match shared.fetch_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                shared.budget.release();
                collector_warn!("Fetch permits unavailable, skipping {}: {}", address.location, err);
                continue;
            }
        };
        shared.tracker.spawn(fetch_unit(
            shared.clone(),
            address,
            permit,
            contents.clone(),
        ));
    };

    // Closing the frontier here makes late resolve units drop their address.
    drop(addresses);
    shared.stage_stopped(Stage::Fetch, reason);
}

async fn fetch_unit(
    shared: Arc<Shared>,
    address: Address,
    permit: OwnedSemaphorePermit,
    contents: mpsc::Sender<Content>,
) {
    let result = shared.fetcher.fetch(&address).await;
    drop(permit);

    let content = match result {
        Ok(content) => content,
        Err(error) => {
            shared.budget.release();
            bump(&shared.counters.fetch_failures);
            collector_warn!("Fetch failed for {}: {}", address.location, error);
            shared.sink.emit(EngineEvent::FetchFailed { address, error });
            return;
        }
    };

    collector_debug!(
        "Fetched {} ({} content, {} bytes, depth {})",
        address.location,
        content.kind,
        content.payload.len(),
        address.depth
    );
    shared.sink.emit(EngineEvent::Fetched {
        location: address.location,
        depth: address.depth,
        bytes: content.payload.len(),
    });

    if let Err(mpsc::error::SendError(content)) = contents.send(content).await {
        collector_warn!(
            "Resolve stage already stopped, dropping {} content {:?}",
            content.kind,
            content.name
        );
        shared.dropped(Stage::Resolve);
    }
}

async fn run_resolve_stage(
    shared: Arc<Shared>,
    mut contents: mpsc::Receiver<Content>,
    addresses: mpsc::Sender<Address>,
) {
    let reason = loop {
        let content = match next_item(&mut contents, shared.config.idle_timeout).await {
            Ok(content) => content,
            Err(reason) => break reason,
        };

        let permit = match shared.resolve_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                collector_warn!("Resolve permits unavailable, skipping {:?}: {}", content.name, err);
                continue;
            }
        };
        shared.tracker.spawn(resolve_unit(
            shared.clone(),
            content,
            permit,
            addresses.clone(),
        ));
    };

    drop(contents);
    shared.stage_stopped(Stage::Resolve, reason);
}

async fn resolve_unit(
    shared: Arc<Shared>,
    content: Content,
    permit: OwnedSemaphorePermit,
    addresses: mpsc::Sender<Address>,
) {
    let result = shared.resolver.resolve(&content).await;
    drop(permit);

    match result {
        Ok(Some(next)) => {
            bump(&shared.counters.resolved);
            shared.sink.emit(EngineEvent::Resolved {
                depth: content.depth,
                next: Some(next.clone()),
            });
            if let Err(mpsc::error::SendError(next)) = addresses.send(next).await {
                collector_warn!(
                    "Fetch stage already stopped, dropping address {}",
                    next.location
                );
                shared.dropped(Stage::Fetch);
            }
        }
        Ok(None) => {
            bump(&shared.counters.terminal);
            shared.sink.emit(EngineEvent::Resolved {
                depth: content.depth,
                next: None,
            });
        }
        Err(err) => {
            bump(&shared.counters.resolve_failures);
            collector_warn!(
                "Resolve failed for {} content {:?}: {}",
                content.kind,
                content.name,
                err
            );
            shared.sink.emit(EngineEvent::ResolveFailed {
                name: content.name,
                depth: content.depth,
                message: err.to_string(),
            });
        }
    }
}
