//! Core engine: credential gating, retries, submission sessions and the
//! cycle orchestrator that ties them together.

pub mod gate;
pub mod orchestrator;
pub mod retry;
pub mod session;

use thiserror::Error;

use crate::driver::DriverError;
use retry::Retryable;

/// Failures that abort a whole marketplace task.
///
/// Per-keyword problems never reach this level; they settle as `error`
/// results inside the task. What remains is session plumbing (retryable
/// when transient) and login rejection (never retryable).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("login failed: {0}")]
    Login(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        match self {
            TaskError::Login(_) => false,
            TaskError::Driver(e) => e.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_errors_never_retry() {
        assert!(!TaskError::Login("bad credentials".to_string()).is_retryable());
    }

    #[test]
    fn test_driver_errors_delegate_transience() {
        let transient = TaskError::Driver(DriverError::Timeout {
            waited_ms: 100,
            what: "session".to_string(),
        });
        assert!(transient.is_retryable());

        let fatal = TaskError::Driver(DriverError::SessionClosed);
        assert!(!fatal.is_retryable());
    }
}
