//! Image resolution
//!
//! Decides per invocation whether to build, pull or reuse an image, and
//! performs that work through a [`Backend`].

use crate::backend::Backend;
use crate::command::CommandSpec;
use crate::error::Result;
use tracing::{debug, info, warn};

/// Prefix of images built from inline Dockerfiles
pub const IMAGE_PREFIX: &str = "dox";

/// Name of the image built for `command` from its inline Dockerfile
pub fn inline_image_name(command: &str) -> String {
    format!("{}-{}:latest", IMAGE_PREFIX, command)
}

/// Whether an image reference is pinned to a content digest
pub fn is_pinned(image: &str) -> bool {
    image.contains('@')
}

/// Split an image reference into `(repository, tag_or_digest)`.
///
/// A missing tag defaults to `latest`; a registry port is not mistaken for a
/// tag.
pub fn split_reference(image: &str) -> (&str, &str) {
    if let Some((repo, digest)) = image.split_once('@') {
        return (repo, digest);
    }
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

/// Whether the image should be refreshed before running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildDecision {
    forced: bool,
    definition_changed: bool,
}

impl RebuildDecision {
    /// Combine the explicit upgrade flag with the version tracker's change signal
    pub fn new(forced: bool, definition_changed: bool) -> Self {
        Self {
            forced,
            definition_changed,
        }
    }

    /// The effective decision for `spec`.
    ///
    /// A changed definition only matters for inline builds; a registry
    /// image is refreshed only when forced.
    pub fn applies_to(&self, spec: &CommandSpec) -> bool {
        self.forced || (self.definition_changed && spec.inline_build().is_some())
    }
}

/// Makes sure the image for a command exists before it runs
pub struct ImageResolver<'a> {
    backend: &'a dyn Backend,
}

impl<'a> ImageResolver<'a> {
    /// Resolve through `backend`
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Make sure the image for `spec`, registered under `command`, exists and
    /// return its name.
    pub async fn resolve(
        &self,
        spec: &CommandSpec,
        command: &str,
        rebuild: RebuildDecision,
    ) -> Result<String> {
        let rebuild = rebuild.applies_to(spec);

        if let Some(dockerfile) = spec.inline_build() {
            let name = inline_image_name(command);
            if rebuild {
                self.remove_quietly(&name).await;
            }
            info!("Building image {}", name);
            self.backend
                .build_image(dockerfile, &name)
                .await
                .map_err(|e| e.for_image(&name))?;
            return Ok(name);
        }

        let name = spec.image.trim().to_string();
        if is_pinned(&name) {
            debug!("{} is pinned to a digest, not refreshing", name);
            return Ok(name);
        }

        if rebuild {
            info!("Pulling image {}", name);
            if let Err(e) = self.backend.pull_image(&name).await {
                warn!("Failed to pull {}, using cached image: {}", name, e);
            }
        }

        Ok(name)
    }

    async fn remove_quietly(&self, image: &str) {
        match self.backend.remove_image(image).await {
            Ok(()) => debug!("Removed image {}", image),
            Err(e) if e.is_not_found() => debug!("No existing image {} to remove", image),
            Err(e) => warn!("Failed to remove image {}: {}", image, e),
        }
    }
}
