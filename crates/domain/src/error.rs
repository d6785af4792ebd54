/// Shared error type used across all Switchboard crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP-level failure. `status` is `None` when no response arrived
    /// at all (connect failure, reset mid-request).
    #[error("HTTP {status:?}: {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("tool: {0}")]
    Tool(String),

    #[error("config: {0}")]
    Config(String),

    #[error("session: {0}")]
    Session(String),

    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Transient: no HTTP response at all, 429, any 5xx, a timeout, or a
    /// provider error explicitly marked retryable.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status: None, .. } => true,
            Error::Http {
                status: Some(code), ..
            } => *code == 429 || (500..=599).contains(code),
            Error::Timeout(_) => true,
            Error::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
