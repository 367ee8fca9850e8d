use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username cannot contain the \"@\" symbol.")]
    InvalidUsername,
    #[error("Username cannot be empty.")]
    EmptyUsername,
    #[error("Full name cannot be empty.")]
    EmptyFullName,
    #[error("Password must be at least {0} characters.")]
    WeakPassword(usize),
    #[error("Invalid login credentials.")]
    InvalidCredentials,
    #[error("This username is already taken.")]
    UsernameTaken,
    #[error("User with this username already exists.")]
    AccountExists,
    #[error("An unexpected error occurred.")]
    Backend(#[from] anyhow::Error),
}

/// Failures surfaced by the conversation state machine. Every variant is
/// caught at its operation boundary and rendered inline.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Could not load your profile. Please try again.")]
    ProfileLoad(#[source] anyhow::Error),
    #[error("Could not load your profile. Please try again.")]
    ProfileMissing,
    #[error("Could not load users.")]
    DirectoryLoad(#[source] anyhow::Error),
    #[error("Could not load messages.")]
    HistoryLoad(#[source] anyhow::Error),
    #[error("Could not send message.")]
    Send(#[source] anyhow::Error),
    #[error("Could not subscribe to new messages.")]
    Subscribe(#[source] anyhow::Error),
}

impl ChatError {
    /// Only a failed profile lookup ends the render cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::ProfileLoad(_) | ChatError::ProfileMissing)
    }
}
