//! Engine backend implementations

pub mod api;
pub mod cli;

pub use api::ApiBackend;
pub use cli::CliBackend;

use crate::backend::Backend;
use crate::error::Result;
use std::sync::Arc;

/// Which backend variant to instantiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    /// The structured API, over the local socket or an explicit host
    Api {
        /// Socket path or URL; `None` for the engine's local defaults
        host: Option<String>,
    },
    /// A client binary such as `podman` or `docker`
    Cli {
        /// The client binary to invoke
        program: String,
    },
}

/// Instantiate the selected backend
pub fn connect(selector: &BackendSelector) -> Result<Arc<dyn Backend>> {
    match selector {
        BackendSelector::Api { host: Some(host) } => Ok(Arc::new(ApiBackend::connect(host)?)),
        BackendSelector::Api { host: None } => Ok(Arc::new(ApiBackend::connect_local()?)),
        BackendSelector::Cli { program } => Ok(Arc::new(CliBackend::new(program.clone()))),
    }
}
