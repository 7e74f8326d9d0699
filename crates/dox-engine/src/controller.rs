//! Execution controller
//!
//! Runs one invocation from start to finish: check the engine, build the
//! request, resolve the image, then hand over to the backend to create, run
//! and wait for the container. Every path ends in
//! [`ExecutionState::Terminal`] and an [`ExitOutcome`].

use crate::backend::{Backend, ExecutionState, Session};
use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::exit::ExitOutcome;
use crate::request::{ExecutionRequest, HostEnvironment};
use crate::resolver::{ImageResolver, RebuildDecision};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One request to run a configured command
#[derive(Debug, Clone)]
pub struct Invocation {
    name: String,
    spec: CommandSpec,
    args: Vec<String>,
    force_upgrade: bool,
    definition_changed: bool,
}

impl Invocation {
    /// Run the command `name` defined by `spec`
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            args: Vec::new(),
            force_upgrade: false,
            definition_changed: false,
        }
    }

    /// Arguments passed through to the container
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Refresh the image before running
    pub fn with_force_upgrade(mut self, force: bool) -> Self {
        self.force_upgrade = force;
        self
    }

    /// The command's definition changed since its last successful run
    pub fn with_definition_changed(mut self, changed: bool) -> Self {
        self.definition_changed = changed;
        self
    }
}

/// Runs invocations against one backend
pub struct Engine {
    backend: Arc<dyn Backend>,
    deadline: Option<Duration>,
}

impl Engine {
    /// Create an engine over `backend`
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            deadline: None,
        }
    }

    /// Abandon a run that has not finished within `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run an invocation on this process's own terminal
    pub async fn run(&self, invocation: &Invocation) -> ExitOutcome {
        match HostEnvironment::capture() {
            Ok(host) => self.execute(invocation, &host, Session::host()).await,
            Err(e) => ExitOutcome::Failed(e),
        }
    }

    /// Run an invocation with explicit host state and session
    pub async fn execute(
        &self,
        invocation: &Invocation,
        host: &HostEnvironment,
        session: Session,
    ) -> ExitOutcome {
        let lifecycle = session.lifecycle.clone();
        let result = self.drive(invocation, host, session).await;
        lifecycle.enter(ExecutionState::Terminal);

        match &result {
            Ok(code) => debug!("{} finished with exit code {}", invocation.name, code),
            Err(e) => debug!("{} failed: {}", invocation.name, e),
        }
        ExitOutcome::from(result)
    }

    async fn drive(
        &self,
        invocation: &Invocation,
        host: &HostEnvironment,
        session: Session,
    ) -> Result<i64> {
        self.backend.is_available().await?;

        session.lifecycle.enter(ExecutionState::Resolving);
        let request =
            ExecutionRequest::build(&invocation.spec, &invocation.name, &invocation.args, host)?;
        let rebuild =
            RebuildDecision::new(invocation.force_upgrade, invocation.definition_changed);
        let image = ImageResolver::new(self.backend.as_ref())
            .resolve(&invocation.spec, &invocation.name, rebuild)
            .await?;
        debug!("Using image {}", image);
        if image != request.image() {
            return Err(Error::resolution(
                &image,
                format!("resolved image does not match requested {}", request.image()),
            ));
        }

        let watchdog = self.deadline.map(|deadline| watch(deadline, session.cancel.clone()));
        let result = self.backend.create_and_run(&request, session).await;
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        result
    }
}

/// Cancel `cancel` once `deadline` has passed
fn watch(deadline: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(deadline) => {
                warn!("Execution deadline exceeded");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}
