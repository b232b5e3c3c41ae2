//! Stateful UI components. Each tracks its own operation state and performs
//! at most one backend call per user action.

pub mod publish;
pub mod upload;

/// Lifecycle of a single user-triggered operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationState<T> {
    Idle,
    InProgress {
        /// Percentage in `0..=100`; stays 0 for calls without progress.
        progress: u8,
    },
    Done(T),
    Failed(String),
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        OperationState::Idle
    }
}

impl<T> OperationState<T> {
    pub fn is_busy(&self) -> bool {
        matches!(self, OperationState::InProgress { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            OperationState::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationState::Failed(message) => Some(message),
            _ => None,
        }
    }
}
