//! Error kinds surfaced by the tutoring core.

use crate::flow::ConversationStage;

/// Every failure the identity manager, the flow controller or the progress
/// aggregator can report. All of them are scoped to the current request.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("An account with email '{0}' already exists")]
    DuplicateEmail(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Cannot {action} while in the {stage} stage")]
    InvalidTransition {
        stage: ConversationStage,
        action: &'static str,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid or expired password reset token")]
    InvalidResetToken,
    /// The LLM output could not be turned into the expected structure.
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),
    /// The LLM provider or the database failed or was unreachable.
    #[error("External service failure: {0:#}")]
    ExternalServiceFailure(anyhow::Error),
}

impl From<anyhow::Error> for TutorError {
    fn from(err: anyhow::Error) -> Self {
        Self::ExternalServiceFailure(err)
    }
}

pub type TutorResult<T> = Result<T, TutorError>;
