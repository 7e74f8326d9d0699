//! Container command execution engine
//!
//! Runs a command inside a transient container so that, from the caller's
//! terminal, it behaves like a host process: it inherits stdio, terminal
//! size and signals, and its exit code becomes the caller's.
//!
//! # Example
//!
//! ```rust,no_run
//! use dox_engine::{CommandSpec, Engine, Invocation, backends::{self, BackendSelector}};
//!
//! # async fn example() -> dox_engine::Result<()> {
//! let backend = backends::connect(&BackendSelector::Api { host: None })?;
//! let engine = Engine::new(backend);
//!
//! let spec = CommandSpec::from_image("alpine:3.19");
//! let invocation = Invocation::new("shell", spec)
//!     .with_args(vec!["echo".to_string(), "hi".to_string()]);
//!
//! let outcome = engine.run(&invocation).await;
//! std::process::exit(outcome.code());
//! # }
//! ```

#![warn(missing_docs)]

pub mod attach;
pub mod backend;
pub mod backends;
pub mod command;
pub mod controller;
pub mod error;
pub mod exit;
pub mod io;
pub mod ports;
pub mod progress;
pub mod request;
pub mod resolver;
pub mod signals;
pub mod terminal;

// Re-export main types
pub use attach::{Attachment, ContainerEngine, run_attached};
pub use backend::{Backend, ExecutionState, Lifecycle, Session};
pub use command::{CommandSpec, NetworkMode};
pub use controller::{Engine, Invocation};
pub use error::{Error, Result};
pub use exit::{ExitOutcome, LOCAL_FAILURE_CODE};
pub use io::{HostIo, OutputChunk};
pub use ports::PortBinding;
pub use request::{ExecutionRequest, HostEnvironment, WORKSPACE_PATH};
pub use resolver::{ImageResolver, RebuildDecision, inline_image_name, is_pinned};
pub use signals::{SignalRelay, SignalSource};
pub use terminal::{RawMode, TerminalSize};

// Re-export the signal type used by the relay and kill requests
pub use nix::sys::signal::Signal;
