use std::fmt;

use crate::persist::PersistError;

/// A crawl target plus its hop depth from the seed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub location: String,
    pub depth: u32,
}

impl Address {
    pub fn new(location: impl Into<String>, depth: u32) -> Self {
        Self {
            location: location.into(),
            depth,
        }
    }

    /// The address a crawl starts from (depth 0).
    pub fn seed(location: impl Into<String>) -> Self {
        Self::new(location, 0)
    }
}

/// A fetched resource. `depth` is carried forward from the producing [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub kind: String,
    pub name: String,
    pub payload: Vec<u8>,
    pub depth: u32,
}

impl Content {
    /// Builds the next address to crawl, one hop deeper than this content.
    pub fn follow_up(&self, location: impl Into<String>) -> Address {
        Address::new(location, self.depth.saturating_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MissingContentType,
    UnsupportedContentType { content_type: String },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::MissingContentType => write!(f, "missing content type"),
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to persist content: {0}")]
    Persist(#[from] PersistError),
    #[error("cannot process {kind} content: {message}")]
    Unprocessable { kind: String, message: String },
}

/// Which of the two long-running stages an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Resolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing arrived on the stage's input queue within the idle timeout.
    IdleTimeout,
    /// Every producer for the stage's input queue is gone and the queue is empty.
    UpstreamClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DepthLimit { max_depth: u32 },
    FetchLimit { fetch_limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Rejected {
        address: Address,
        reason: RejectReason,
    },
    Fetched {
        location: String,
        depth: u32,
        bytes: usize,
    },
    FetchFailed {
        address: Address,
        error: FetchError,
    },
    Resolved {
        depth: u32,
        next: Option<Address>,
    },
    ResolveFailed {
        name: String,
        depth: u32,
        message: String,
    },
    /// An item was abandoned because the stage it was addressed to had stopped.
    Dropped { stage: Stage },
    StageStopped { stage: Stage, reason: StopReason },
}

/// Totals for a finished run, returned by [`crate::Engine::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlReport {
    pub fetched: u32,
    pub fetch_failures: u64,
    pub rejected_depth: u64,
    pub rejected_limit: u64,
    pub resolved: u64,
    pub terminal: u64,
    pub resolve_failures: u64,
    pub dropped_contents: u64,
    pub dropped_addresses: u64,
}
