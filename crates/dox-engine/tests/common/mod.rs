//! Common test utilities: an in-process container engine

#![allow(dead_code)]

use async_trait::async_trait;
use dox_engine::{
    Attachment, Backend, ContainerEngine, Error, ExecutionRequest, HostEnvironment, HostIo,
    OutputChunk, Result, Session, Signal, SignalSource, TerminalSize, run_attached,
};
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::{Notify, mpsc};

/// Every operation the fake engine was asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsAvailable,
    Pull(String),
    Build(String),
    RemoveImage(String),
    Create(String),
    Attach,
    Start,
    Resize,
    Wait,
    Kill(Signal),
    RemoveContainer,
}

/// How the container's exit is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMode {
    /// Exit as soon as waited on
    Immediate,
    /// Exit once a signal has been delivered
    OnSignal,
    /// Never exit
    Never,
    /// The wait request itself fails
    WaitFails,
}

/// In-process engine recording every call
pub struct FakeEngine {
    pub available: bool,
    pub pull_fails: bool,
    pub build_fails: bool,
    pub kill_fails: bool,
    pub exit_code: i64,
    pub exit_mode: ExitMode,
    pub output: Vec<OutputChunk>,
    images: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    exited: Notify,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            pull_fails: false,
            build_fails: false,
            kill_fails: false,
            exit_code: 0,
            exit_mode: ExitMode::Immediate,
            output: Vec::new(),
            images: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            exited: Notify::new(),
        }
    }

    pub fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.images.lock().unwrap().contains(image)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Backend for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn is_available(&self) -> Result<()> {
        self.record(Call::IsAvailable);
        if self.available {
            Ok(())
        } else {
            Err(Error::unavailable("Docker daemon not responding. Is Docker running?"))
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(Call::Pull(image.to_string()));
        if self.pull_fails {
            return Err(Error::resolution(image, "registry unreachable"));
        }
        self.images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn build_image(&self, _dockerfile: &str, tag: &str) -> Result<()> {
        self.record(Call::Build(tag.to_string()));
        if self.build_fails {
            return Err(Error::resolution(tag, "RUN exit code 1"));
        }
        self.images.lock().unwrap().insert(tag.to_string());
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        let mut images: Vec<String> = self.images.lock().unwrap().iter().cloned().collect();
        images.sort();
        Ok(images)
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.record(Call::RemoveImage(image.to_string()));
        if self.images.lock().unwrap().remove(image) {
            Ok(())
        } else {
            Err(Error::ImageNotFound {
                image: image.to_string(),
            })
        }
    }

    async fn remove_stopped_containers(&self) -> Result<usize> {
        Ok(0)
    }

    async fn create_and_run(&self, request: &ExecutionRequest, session: Session) -> Result<i64> {
        run_attached(self, request, session).await
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create_container(&self, request: &ExecutionRequest) -> Result<String> {
        self.record(Call::Create(request.image().to_string()));
        if self.has_image(request.image()) {
            Ok("c0ffee".to_string())
        } else {
            Err(Error::ImageNotFound {
                image: request.image().to_string(),
            })
        }
    }

    async fn attach_container(&self, _id: &str) -> Result<Attachment> {
        self.record(Call::Attach);
        let chunks: Vec<Result<OutputChunk>> = self.output.iter().cloned().map(Ok).collect();
        Ok(Attachment {
            output: stream::iter(chunks).boxed(),
            input: Box::pin(tokio::io::sink()),
        })
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        self.record(Call::Start);
        Ok(())
    }

    async fn resize_container(&self, _id: &str, _size: TerminalSize) -> Result<()> {
        self.record(Call::Resize);
        Ok(())
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        self.record(Call::Wait);
        match self.exit_mode {
            ExitMode::Immediate => Ok(self.exit_code),
            ExitMode::OnSignal => {
                self.exited.notified().await;
                Ok(self.exit_code)
            }
            ExitMode::Never => std::future::pending().await,
            ExitMode::WaitFails => Err(Error::Api(
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 500,
                    message: "connection reset".to_string(),
                },
            )),
        }
    }

    async fn kill_container(&self, _id: &str, signal: Signal) -> Result<()> {
        self.record(Call::Kill(signal));
        self.exited.notify_one();
        if self.kill_fails {
            Err(Error::stream("container is not running"))
        } else {
            Ok(())
        }
    }

    async fn remove_container(&self, _id: &str) -> Result<()> {
        self.record(Call::RemoveContainer);
        Ok(())
    }
}

/// An in-memory writer shared between the test and the engine
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Captured host side of a session
pub struct Captured {
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
    pub signals: mpsc::UnboundedSender<Signal>,
}

/// A session on in-memory streams with a controllable signal source
pub fn session() -> (Session, Captured) {
    let stdout = SharedBuffer::default();
    let stderr = SharedBuffer::default();
    let (signals, source) = SignalSource::channel();
    let io = HostIo::new(tokio::io::empty(), stdout.clone(), stderr.clone());
    (
        Session::new(io, source),
        Captured {
            stdout,
            stderr,
            signals,
        },
    )
}

/// A non-interactive host with a few environment variables
pub fn host() -> HostEnvironment {
    HostEnvironment {
        cwd: PathBuf::from("/home/dev/project"),
        uid: 1000,
        gid: 1000,
        vars: HashMap::from([("HOME".to_string(), "/home/dev".to_string())]),
        interactive: false,
        terminal_size: None,
    }
}
