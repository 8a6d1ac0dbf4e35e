use thiserror::Error;

use crate::jobs::JobClass;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{0}")]
    Transport(String),
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        detail: Option<String>,
        logs: Vec<String>,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no entities selected")]
    EmptySelection,
    #[error("an action is already running for competition {0}")]
    ActionInProgress(String),
    #[error("operator confirmation required")]
    ConfirmationRequired,
    #[error("a {0} job is already in progress")]
    JobBusy(JobClass),
}

impl ConsoleError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            detail: None,
            logs: Vec::new(),
        }
    }

    /// Text shown on a panel or job log; empty messages fall back to `fallback`.
    pub fn display_message(&self, fallback: &str) -> String {
        let text = self.to_string();
        if text.trim().is_empty() {
            fallback.to_string()
        } else {
            text
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Operator input rejected before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Enter a value to adjust the score.")]
    EmptyAmount,
    #[error("Adjustment must be a whole number.")]
    NotWholeNumber,
    #[error("Amount must be non-zero.")]
    ZeroAmount,
    #[error("Select a competition package")]
    MissingPackage,
    #[error("Package must be a .zip file")]
    NotZip,
    #[error("Package exceeds the 75 MB limit")]
    PackageTooLarge,
    #[error("File is missing a ZIP signature")]
    MissingZipSignature,
}
