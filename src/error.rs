use thiserror::Error;

/// A request that cannot be advised on as submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            reason: "required field is missing or empty".to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to the text-generation service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 429 from the service
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Generation service error (HTTP {status}): {body}")]
    ServerError { status: u16, body: String },

    /// 503 / 529 class responses
    #[error("Generation service unavailable (HTTP {0})")]
    Unavailable(u16),

    #[error("Timeout waiting for generation service")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// Whether another attempt might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited
                | TransportError::ServerError { .. }
                | TransportError::Unavailable(_)
                | TransportError::Timeout
                | TransportError::Network(_)
        )
    }

    /// Map a non-success HTTP status to a transport error
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => TransportError::Authentication(body),
            408 => TransportError::Timeout,
            429 => TransportError::RateLimited,
            503 | 529 => TransportError::Unavailable(status),
            500..=599 => TransportError::ServerError { status, body },
            400..=499 => TransportError::InvalidRequest(format!("HTTP {}: {}", status, body)),
            _ => TransportError::Unexpected(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Unexpected(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Why a generation attempt (or the whole strategy) failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No structured object could be extracted from the generated text
    #[error("Could not parse generated output: {0}")]
    Parse(String),

    /// Structured object present but not in a usable shape
    #[error("Generated output has unusable structure: {0}")]
    Structure(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("Generation gave up after {attempts} call(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Whether the strategy may spend another attempt on this failure
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(err) => err.is_recoverable(),
            GenerationError::Parse(_) | GenerationError::Structure(_) => true,
            GenerationError::DeadlineExceeded | GenerationError::Exhausted { .. } => false,
        }
    }
}

/// Storage failures; logged, never surfaced to callers
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

/// The only error the advisor entry points report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvisorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
