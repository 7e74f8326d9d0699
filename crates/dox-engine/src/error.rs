//! Error types for container execution

use thiserror::Error;

/// Unified error type for the execution engine
#[derive(Error, Debug)]
pub enum Error {
    /// The selected container engine cannot be reached
    #[error("{reason}")]
    Unavailable {
        /// Human-readable explanation, reported to the user verbatim
        reason: String,
    },

    /// A required image build or pull failed
    #[error("failed to resolve image {image}: {reason}")]
    Resolution {
        /// The image that could not be produced
        image: String,
        /// The underlying failure
        reason: String,
    },

    /// The engine has no image by this reference
    #[error("no such image: {image}")]
    ImageNotFound {
        /// The missing image reference
        image: String,
    },

    /// Container creation, attachment or start failed
    #[error("failed to create container: {reason}")]
    Creation {
        /// The underlying failure
        reason: String,
    },

    /// An I/O copy or signal delivery failed after the container started
    #[error("stream failure: {reason}")]
    Stream {
        /// The underlying failure
        reason: String,
    },

    /// The engine's control channel failed while waiting for the container
    #[error("error waiting for container: {reason}")]
    Wait {
        /// The underlying failure
        reason: String,
    },

    /// The execution was cancelled before the container exited
    #[error("execution cancelled before the container exited")]
    Cancelled,

    /// A command specification could not be turned into a container request
    #[error("invalid command specification: {reason}")]
    InvalidSpec {
        /// What is wrong with the command definition
        reason: String,
    },

    /// Failed to launch the container engine's client binary
    #[error("failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// The client binary
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// A client subcommand exited unsuccessfully
    #[error("`{command}` failed: {output}")]
    CommandFailed {
        /// The subcommand that failed, e.g. `podman pull alpine`
        command: String,
        /// Combined output of the subcommand
        output: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (terminal state, signal delivery)
    #[error(transparent)]
    Nix(#[from] nix::Error),

    /// Structured API error
    #[error(transparent)]
    Api(#[from] bollard::errors::Error),
}

impl Error {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a resolution error for an image
    pub fn resolution(image: impl Into<String>, reason: impl ToString) -> Self {
        Self::Resolution {
            image: image.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a creation error
    pub fn creation(reason: impl ToString) -> Self {
        Self::Creation {
            reason: reason.to_string(),
        }
    }

    /// Create a stream error
    pub fn stream(reason: impl ToString) -> Self {
        Self::Stream {
            reason: reason.to_string(),
        }
    }

    /// Create a wait error
    pub fn wait(reason: impl ToString) -> Self {
        Self::Wait {
            reason: reason.to_string(),
        }
    }

    /// Create an invalid specification error
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl ToString) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error means the referenced image does not exist.
    ///
    /// Both backends report this differently: the structured API answers with
    /// a 404, the client binaries print a message.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ImageNotFound { .. } => true,
            Error::Api(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            Error::CommandFailed { output, .. } => {
                let output = output.to_lowercase();
                output.contains("no such image")
                    || output.contains("image not known")
                    || output.contains("not found")
            }
            _ => false,
        }
    }

    /// Report this failure as a failure to produce `image`
    pub fn for_image(self, image: &str) -> Self {
        match self {
            Error::Resolution { .. } => self,
            other => Error::resolution(image, other),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(Error::ImageNotFound { image: "a".into() }.is_not_found());

        let api = Error::Api(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such image: alpine:3.19".into(),
        });
        assert!(api.is_not_found());

        let conflict = Error::Api(bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "image is being used by running container".into(),
        });
        assert!(!conflict.is_not_found());

        let cli = Error::CommandFailed {
            command: "podman rmi dox-tool:latest".into(),
            output: "Error: dox-tool:latest: image not known".into(),
        };
        assert!(cli.is_not_found());

        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_unavailable_message_is_verbatim() {
        let err = Error::unavailable("Docker daemon not responding. Is Docker running?");
        assert_eq!(
            err.to_string(),
            "Docker daemon not responding. Is Docker running?"
        );
    }

    #[test]
    fn test_for_image_wraps_once() {
        let err = Error::spawn_failed("podman", "permission denied").for_image("dox-tool:latest");
        assert!(matches!(err, Error::Resolution { ref image, .. } if image == "dox-tool:latest"));

        let again = err.for_image("other");
        assert_eq!(
            again.to_string(),
            "failed to resolve image dox-tool:latest: failed to spawn podman: permission denied"
        );
    }
}
