//! Attached container lifecycle
//!
//! Engines that expose container operations as separate steps implement
//! [`ContainerEngine`]; [`run_attached`] drives those steps in order:
//! create, attach, start, then copy I/O and relay signals while waiting for
//! the exit event.

use crate::backend::{Backend, ExecutionState, Session};
use crate::error::{Error, Result};
use crate::io::{OutputChunk, copy_input, copy_output};
use crate::request::ExecutionRequest;
use crate::signals::SignalRelay;
use crate::terminal::{RawMode, TerminalSize};
use async_trait::async_trait;
use futures::stream::BoxStream;
use nix::sys::signal::Signal;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

/// How long to keep copying output after the container has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Streams of an attached container
pub struct Attachment {
    /// Container output, as frames
    pub output: BoxStream<'static, Result<OutputChunk>>,
    /// Container stdin
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

/// A container engine whose lifecycle steps can be driven one by one
#[async_trait]
pub trait ContainerEngine: Backend {
    /// Create a container, returning its id.
    ///
    /// Fails with an error for which [`Error::is_not_found`] is true when the
    /// image is absent.
    async fn create_container(&self, request: &ExecutionRequest) -> Result<String>;

    /// Attach to a created container's stdin, stdout and stderr
    async fn attach_container(&self, id: &str) -> Result<Attachment>;

    /// Start a created container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Resize the container's pseudo-terminal
    async fn resize_container(&self, id: &str, size: TerminalSize) -> Result<()>;

    /// Wait for the container to stop and return its exit status
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Send a signal to the container's main process
    async fn kill_container(&self, id: &str, signal: Signal) -> Result<()>;

    /// Remove the container, stopping it if needed
    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Run `request` to completion on `engine`
pub async fn run_attached<E>(engine: &E, request: &ExecutionRequest, session: Session) -> Result<i64>
where
    E: ContainerEngine + ?Sized,
{
    session.lifecycle.enter(ExecutionState::Creating);
    let id = create_with_retry(engine, request).await?;
    debug!("Created container {}", id);

    let result = drive(engine, &id, request, session).await;

    if let Err(e) = engine.remove_container(&id).await {
        debug!("Failed to remove container {}: {}", id, e);
    }
    result
}

/// Create the container, pulling the image once if the engine does not have it
async fn create_with_retry<E>(engine: &E, request: &ExecutionRequest) -> Result<String>
where
    E: ContainerEngine + ?Sized,
{
    match engine.create_container(request).await {
        Ok(id) => Ok(id),
        Err(e) if e.is_not_found() => {
            info!("Image {} not found locally, pulling", request.image());
            engine
                .pull_image(request.image())
                .await
                .map_err(|e| e.for_image(request.image()))?;
            engine
                .create_container(request)
                .await
                .map_err(Error::creation)
        }
        Err(e) => Err(Error::creation(e)),
    }
}

async fn drive<E>(
    engine: &E,
    id: &str,
    request: &ExecutionRequest,
    session: Session,
) -> Result<i64>
where
    E: ContainerEngine + ?Sized,
{
    let Session {
        io,
        signals,
        cancel,
        lifecycle,
    } = session;

    // Attach before start so no output is lost
    let Attachment { output, input } = engine
        .attach_container(id)
        .await
        .map_err(Error::creation)?;
    lifecycle.enter(ExecutionState::Attached);

    engine.start_container(id).await.map_err(Error::creation)?;
    lifecycle.enter(ExecutionState::Running);

    let mut raw_mode = None;
    if request.tty() {
        match RawMode::enter() {
            Ok(guard) => raw_mode = Some(guard),
            Err(e) => warn!("Could not switch terminal to raw mode: {}", e),
        }
        if let Some(size) = request.terminal_size() {
            if let Err(e) = engine.resize_container(id, size).await {
                debug!("Failed to resize container tty: {}", e);
            }
        }
    }

    let mut relay = match SignalRelay::install(signals) {
        Ok(relay) => Some(relay),
        Err(e) => {
            warn!("Signals will not be forwarded to the container: {}", e);
            None
        }
    };

    let tty = request.tty();
    let stdin_task = tokio::spawn(copy_input(io.stdin, input));
    let mut output_task =
        tokio::spawn(async move { copy_output(output, io.stdout, io.stderr, tty).await });

    lifecycle.enter(ExecutionState::Waiting);
    let relay_signals = async {
        if let Some(relay) = relay.as_mut() {
            relay
                .forward(|signal| engine.kill_container(id, signal))
                .await;
        }
        std::future::pending::<Infallible>().await
    };

    let result = tokio::select! {
        status = engine.wait_container(id) => status.map_err(|e| match e {
            Error::Wait { .. } => e,
            other => Error::wait(other),
        }),
        _ = cancel.cancelled() => Err(Error::Cancelled),
        never = relay_signals => match never {},
    };
    drop(relay);
    stdin_task.abort();

    match &result {
        Ok(code) => {
            debug!("Container {} exited with status {}", id, code);
            match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut output_task).await {
                Ok(Ok(Err(e))) => debug!("Output copy ended with error: {}", e),
                Ok(Err(e)) => debug!("Output copy task failed: {}", e),
                Err(_) => debug!("Output still open after exit, abandoning"),
                Ok(Ok(Ok(()))) => {}
            }
        }
        Err(e) => debug!("Wait for container {} ended without status: {}", id, e),
    }
    output_task.abort();

    if let Some(mut guard) = raw_mode.take() {
        guard.restore();
    }
    result
}

