//! Scheduler error types

use crate::task::TaskId;

/// Highest slice rate (slices per second) a host accepts.
pub const MAX_SLICE_RATE: u32 = 125;

/// Errors surfaced by the scheduler and its host adapters.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A target slice rate outside `0..=MAX_SLICE_RATE` was requested.
    #[error(
        "slice rate {rate} is out of range: expected 0..={max}, rates above {max} per second are not supported",
        max = MAX_SLICE_RATE
    )]
    InvalidSliceRate { rate: u32 },

    /// A task callback failed. The task is consumed; the scheduler stays usable.
    #[error("task {task_id} failed")]
    TaskFault {
        task_id: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid scheduler config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// The id of the faulting task, if this is a task fault.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SchedulerError::TaskFault { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}
