use thiserror::Error;

use crate::store::StoreError;

/// Failure of a chat, profile or moderation operation. Only `Invalid` and
/// `Store` are ever shown to the caller; the rest fail silently so nothing
/// about private state leaks.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Invalid(String),

    #[error("not permitted")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub const GENERIC_FAILURE: &str = "Something went wrong, please try again";

impl ChatError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    /// Text for the `error` event, or `None` when the failure must stay silent.
    pub fn client_message(&self) -> Option<String> {
        match self {
            Self::Invalid(reason) => Some(reason.clone()),
            Self::Store(_) => Some(GENERIC_FAILURE.to_string()),
            Self::Forbidden | Self::NotFound => None,
        }
    }
}
