use thiserror::Error;

/// Errors surfaced by the AniList query queue.
///
/// `RateLimitExceeded` and `MaxRetriesExceeded` are the exhausted-retry
/// outcomes; `Upstream` and `Graphql` are rejected immediately.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Max retries exceeded after {attempts} attempts (last status {status})")]
    MaxRetriesExceeded { attempts: u32, status: u16 },

    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Query queue closed")]
    Closed,
}

impl QueueError {
    /// True for the outcomes produced once the retry budget is spent.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::MaxRetriesExceeded { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot {name} unavailable: {reason}")]
    Unavailable { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot parse error: {0}")]
    Parse(String),

    #[error("Snapshot download failed: {0}")]
    Download(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Identifier is missing a prefix: {0}")]
    MissingPrefix(String),

    #[error("Unknown identifier prefix: {0}")]
    UnknownPrefix(String),

    #[error("Identifier has a non-numeric id: {0}")]
    InvalidId(String),
}

/// Failure of one unit of orchestrator work. Never crosses the orchestrator
/// boundary: callers see an empty page or absent meta instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
