use crate::api::ErrorBody;
use crate::models::HeaderMap;
use thiserror::Error;

/// Coarse classification of a failed backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend could not be reached at all (status 0)
    Connectivity,
    /// Request rejected as invalid (400)
    Validation,
    /// Identifier already taken (409)
    Conflict,
    /// Quota exhausted (429); expected when exercising the limiter
    RateLimited,
    /// Any other failure
    Server,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => ErrorKind::Connectivity,
            400 => ErrorKind::Validation,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Server,
        }
    }
}

/// Errors returned by backend calls
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status} error occurred")]
    Http {
        status: u16,
        body: ErrorBody,
        headers: HeaderMap,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Build an HTTP error without headers, mostly for mocks and tests
    pub fn status(status: u16, body: ErrorBody) -> Self {
        ApiError::Http {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    /// HTTP status code, 0 when no response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unreachable(_) => Some(0),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::InvalidResponse(_) => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unreachable(_) => ErrorKind::Connectivity,
            ApiError::Http { status, .. } => ErrorKind::from_status(*status),
            ApiError::InvalidResponse(_) => ErrorKind::Server,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }

    /// Response headers, if a response was received
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            ApiError::Http { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Message the backend put in the error body, if any
    pub fn body_message(&self) -> Option<String> {
        match self {
            ApiError::Http { body, .. } => body.message(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Unreachable(e.to_string())
        }
    }
}

/// Form input rejected before any request is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },

    #[error("Please fill in all fields")]
    IncompleteForm,

    #[error("No form is open")]
    NoOpenForm,
}

/// Outcome of a failed panel action; already surfaced as a toast
#[derive(Error, Debug, Clone)]
pub enum PanelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Api { message: String, source: ApiError },
}

impl PanelError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            PanelError::Api { source, .. } => Some(source),
            PanelError::Validation(_) => None,
        }
    }
}

/// Console input that cannot be carried out as typed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("'{command}' is not available on the {tab} tab")]
    NotOnTab {
        command: &'static str,
        tab: &'static str,
    },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("{0} cannot be changed while editing")]
    ReadOnly(&'static str),

    #[error("No {kind} for {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("No form is open")]
    NoOpenForm,

    #[error("There is no question to answer")]
    NothingToAnswer,
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
