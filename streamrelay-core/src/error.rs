use thiserror::Error;

/// Relay error taxonomy.
///
/// Variants carry `String` payloads (never source errors) so the enum stays
/// `Clone` — init outcomes are shared across concurrent callers through the
/// singleflight guard.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("No live chat continuation found in session payload")]
    NoContinuation,

    #[error("Continuation descriptor yields no token")]
    NoToken,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Send to closed connection: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
