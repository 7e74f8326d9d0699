//! Exit status reconciliation

use crate::error::Error;

/// Exit code used when the failure is local rather than the container's.
///
/// Container exit codes are passed through unchanged, so only failures that
/// happen before the container runs, or while waiting on it, produce this.
pub const LOCAL_FAILURE_CODE: i32 = 125;

/// How an execution ended
#[derive(Debug)]
pub enum ExitOutcome {
    /// The container ran and exited with this status
    Exited(i64),
    /// The execution failed locally
    Failed(Error),
}

impl ExitOutcome {
    /// The code this process should exit with
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => i32::try_from(*code).unwrap_or(LOCAL_FAILURE_CODE),
            ExitOutcome::Failed(_) => LOCAL_FAILURE_CODE,
        }
    }

    /// Whether the container exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    /// The local failure, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            ExitOutcome::Failed(e) => Some(e),
            ExitOutcome::Exited(_) => None,
        }
    }
}

impl From<crate::error::Result<i64>> for ExitOutcome {
    fn from(result: crate::error::Result<i64>) -> Self {
        match result {
            Ok(code) => ExitOutcome::Exited(code),
            Err(e) => ExitOutcome::Failed(e),
        }
    }
}
