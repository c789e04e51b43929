use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;
pub type ConfigError = Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Feed transport error: {0}")]
    Transport(String),

    #[error("Hydration error for id {id}: {reason}")]
    Hydration { id: u64, reason: String },

    #[error("Feed item parse error: {0}")]
    ItemParse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl Error {
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Transport(_) | Error::Timeout(_) | Error::Io(_)
        )
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::InvalidUrl(_) | Error::Config(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::Transport(_) => "TRANSPORT",
            Error::Hydration { .. } => "HYDRATION",
            Error::ItemParse(_) => "ITEM_PARSE",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidState(_) => "INVALID_STATE",
        }
    }
}
