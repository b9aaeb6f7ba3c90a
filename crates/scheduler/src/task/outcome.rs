use thiserror::Error;

/// Error a task body returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Execution(String),
    /// A backing resource (e.g. a connection) was forcibly interrupted.
    #[error("Resource interrupted: {0}")]
    Interrupted(String),
    /// The body observed its cancellation token.
    #[error("Task canceled")]
    Canceled,
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution(message.to_string())
    }
}

/// Final, published result of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Success(T),
    Failed(TaskError),
    Canceled,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Collapse into a `Result`, mapping cancellation to [`TaskError::Canceled`].
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failed(err) => Err(err),
            Self::Canceled => Err(TaskError::Canceled),
        }
    }
}
