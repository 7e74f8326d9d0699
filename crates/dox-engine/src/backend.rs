//! Engine backend contract
//!
//! Both container engine variants implement [`Backend`]. The rest of the
//! engine only ever holds a `dyn Backend`, chosen once at startup.

use crate::error::Result;
use crate::io::HostIo;
use crate::request::ExecutionRequest;
use crate::signals::SignalSource;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A container engine the execution engine can drive
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Check that the engine can be reached.
    ///
    /// Fails with [`Error::Unavailable`](crate::Error::Unavailable) carrying a
    /// message meant for the user.
    async fn is_available(&self) -> Result<()>;

    /// Pull an image from its registry
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Build an image tagged `tag` from Dockerfile text
    async fn build_image(&self, dockerfile: &str, tag: &str) -> Result<()>;

    /// List local images as `repository:tag` references
    async fn list_images(&self) -> Result<Vec<String>>;

    /// Remove an image by reference
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Remove every stopped container, returning how many were removed
    async fn remove_stopped_containers(&self) -> Result<usize>;

    /// Run a container for `request` to completion and return its exit code
    async fn create_and_run(&self, request: &ExecutionRequest, session: Session) -> Result<i64>;
}

/// Execution controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Nothing has happened yet
    Idle,
    /// Making sure the image exists
    Resolving,
    /// Creating the container
    Creating,
    /// Attached to the created container's streams
    Attached,
    /// Container started
    Running,
    /// Copy tasks running, waiting for the exit event
    Waiting,
    /// Done, successfully or not
    Terminal,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Resolving => "resolving",
            ExecutionState::Creating => "creating",
            ExecutionState::Attached => "attached",
            ExecutionState::Running => "running",
            ExecutionState::Waiting => "waiting",
            ExecutionState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Shared record of the states an execution has passed through
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Arc<Mutex<Vec<ExecutionState>>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![ExecutionState::Idle])),
        }
    }
}

impl Lifecycle {
    /// Record a transition into `state`
    pub fn enter(&self, state: ExecutionState) {
        if let Ok(mut history) = self.history.lock() {
            debug!("{} -> {}", history.last().copied().unwrap_or(ExecutionState::Idle), state);
            history.push(state);
        }
    }

    /// The most recent state
    pub fn current(&self) -> ExecutionState {
        self.history
            .lock()
            .ok()
            .and_then(|history| history.last().copied())
            .unwrap_or(ExecutionState::Idle)
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> Vec<ExecutionState> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

/// Everything a backend needs from the host for one run
pub struct Session {
    /// Host standard streams
    pub io: HostIo,
    /// Where forwarded signals come from
    pub signals: SignalSource,
    /// Cancelled when the run must be abandoned
    pub cancel: CancellationToken,
    /// State transitions of this run
    pub lifecycle: Lifecycle,
}

impl Session {
    /// A session with custom streams and signal source
    pub fn new(io: HostIo, signals: SignalSource) -> Self {
        Self {
            io,
            signals,
            cancel: CancellationToken::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// A session wired to this process's own stdio and signals
    pub fn host() -> Self {
        Self::new(HostIo::inherit(), SignalSource::Host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_records_transitions() {
        let lifecycle = Lifecycle::default();
        let observer = lifecycle.clone();

        lifecycle.enter(ExecutionState::Resolving);
        lifecycle.enter(ExecutionState::Terminal);

        assert_eq!(observer.current(), ExecutionState::Terminal);
        assert_eq!(
            observer.history(),
            vec![
                ExecutionState::Idle,
                ExecutionState::Resolving,
                ExecutionState::Terminal
            ]
        );
    }
}
