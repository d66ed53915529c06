use super::types::TaskState;

/// All errors the task engine surfaces, to request handlers or into a
/// task's terminal `error` field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to download audio: {0}")]
    Fetch(String),

    #[error("Failed to split audio: {0}")]
    Split(String),

    #[error("Transcription failed on part {index} of {total}: {reason}")]
    Transcribe {
        index: usize,
        total: usize,
        reason: String,
    },

    #[error("No active transcription task")]
    NoActiveTask,

    #[error("task already exists: {0}")]
    DuplicateTask(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Too many transcription tasks, try again later")]
    Busy,

    #[error("Unexpected error during transcription")]
    Unexpected,
}

pub type Result<T> = std::result::Result<T, TaskError>;
