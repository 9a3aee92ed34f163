use thiserror::Error;

/// Failure reported by a [`crate::store::ProgressStore`] backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the read/write
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the onboarding core and the progress service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("mission not found: {0}")]
    MissionNotFound(String),

    #[error("quiz not found: {0}")]
    QuizNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Prerequisites unmet or location still locked; progress is untouched
    #[error("mission {mission} is locked (missing: {missing:?}, location locked: {location_locked})")]
    MissionLocked {
        mission: String,
        missing: Vec<String>,
        location_locked: bool,
    },

    #[error("user already registered: {0}")]
    AlreadyRegistered(String),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProgressError {
    /// True when retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ProgressError::Store(_))
    }

    /// True for the "not found" family (unknown mission, quiz or user)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProgressError::MissionNotFound(_)
                | ProgressError::QuizNotFound(_)
                | ProgressError::UserNotFound(_)
        )
    }
}
