//! Build and pull progress validation
//!
//! The engine API reports build and pull progress as a stream of status
//! objects. A request can succeed at the transport level while one of those
//! objects carries an error, so every object is checked.

use crate::error::{Error, Result};
use bollard::models::{BuildInfo, CreateImageInfo};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

/// A progress status object that may embed an error
pub trait ProgressStatus {
    /// The embedded error message, if any
    fn error_message(&self) -> Option<String>;

    /// Human-readable progress text, if any
    fn status_text(&self) -> Option<String>;
}

impl ProgressStatus for CreateImageInfo {
    fn error_message(&self) -> Option<String> {
        self.error_detail
            .as_ref()
            .and_then(|detail| detail.message.clone())
            .or_else(|| self.error.clone())
            .filter(|message| !message.is_empty())
    }

    fn status_text(&self) -> Option<String> {
        self.status.clone()
    }
}

impl ProgressStatus for BuildInfo {
    fn error_message(&self) -> Option<String> {
        self.error_detail
            .as_ref()
            .and_then(|detail| detail.message.clone())
            .or_else(|| self.error.clone())
            .filter(|message| !message.is_empty())
    }

    fn status_text(&self) -> Option<String> {
        self.stream.clone().or_else(|| self.status.clone())
    }
}

/// Consume the progress stream of producing `image`, failing on the first
/// embedded or transport error
pub async fn drain_progress<S, T, E>(image: &str, stream: S) -> Result<()>
where
    S: Stream<Item = std::result::Result<T, E>>,
    T: ProgressStatus,
    E: Into<Error>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        let status = item.map_err(Into::into)?;
        if let Some(message) = status.error_message() {
            return Err(Error::resolution(image, message));
        }
        if let Some(text) = status.status_text() {
            let text = text.trim_end();
            if !text.is_empty() {
                debug!("{}", text);
            }
        }
    }
    Ok(())
}
