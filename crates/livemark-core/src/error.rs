use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the scheduling layer.
///
/// Nothing in livemark produces these during normal operation: render failures are recovered
/// inside the widget. Seeing one means a host task or flush callback failed unexpectedly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("task `{task}` failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("event loop still busy after {iterations} iterations")]
    Unsettled { iterations: usize },
}

impl Error {
    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }
}
