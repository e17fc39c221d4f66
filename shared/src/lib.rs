// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found")]
    NotFound,
    #[error("item '{item_id}' not found for user '{user_id}'")]
    ItemNotFound { user_id: String, item_id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("item '{item_id}' is already dismissed for user '{user_id}'")]
    ItemAlreadyDismissed { user_id: String, item_id: String },
    #[error("item '{item_id}' is not dismissed for user '{user_id}'")]
    ItemNotDismissed { user_id: String, item_id: String },
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable kind, used by boundary code to map errors.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::InvalidState(_) => "invalid_state",
            Error::NotFound => "not_found",
            Error::ItemNotFound { .. } => "item_not_found",
            Error::Conflict(_) => "conflict",
            Error::ItemAlreadyDismissed { .. } => "item_already_dismissed",
            Error::ItemNotDismissed { .. } => "item_not_dismissed",
            Error::Timeout(_) => "timeout",
            Error::Unavailable(_) => "unavailable",
            Error::Internal(_) => "internal",
        }
    }

    pub fn item_not_found(user_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Error::ItemNotFound {
            user_id: user_id.into(),
            item_id: item_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
