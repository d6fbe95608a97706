use thiserror::Error;

/// Failure of a single command handler.
///
/// `Validation` and `NotFound` carry the text shown to the caller. `Internal`
/// is logged and answered with [`GENERIC_FAILURE`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub const GENERIC_FAILURE: &str = "Something went wrong while running this command.";

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        CommandError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CommandError::NotFound(message.into())
    }

    /// Text sent back to the invoking user.
    pub fn reply_text(&self) -> String {
        match self {
            CommandError::Validation(msg) | CommandError::NotFound(msg) => msg.clone(),
            CommandError::Internal(_) => GENERIC_FAILURE.to_string(),
        }
    }
}
