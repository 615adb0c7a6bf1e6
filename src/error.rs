//! Error taxonomy for the publish pipeline
//!
//! Each failure class has its own type, defined next to the module that
//! raises it. Two of them never escape the library: the supervisor absorbs
//! [`ConnectError`](crate::transport::ConnectError) (retried indefinitely)
//! and [`PublishError`](crate::transport::PublishError) (requeued), so the
//! umbrella carries no variants for them.
//!
//! [`PluginError`] is what callers see, either from the facade directly or
//! by `?`-composing the fallible public APIs (decode, sinks, uploads) into
//! a [`PluginResult`]:
//!
//! - [`ConfigError`]: invalid or missing configuration, fatal at creation.
//! - [`FormatError`]: malformed wire text on decode, dropped, not retried.
//! - [`SinkError`]: audit sink setup or write failure.
//! - [`UploadError`]: file staging failure.
//! - [`PluginError::Programmer`]: invalid call-time arguments (missing
//!   app identity, empty name). Unrecoverable misconfiguration: surfaced
//!   as an error instead of aborting the process, but `is_fatal` keeps
//!   the severity explicit so callers do not treat it as retryable.

use crate::config::ConfigError;
use crate::protocol::FormatError;
use crate::sink::SinkError;
use crate::uploader::UploadError;
use thiserror::Error;

/// Main error type for plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("malformed wire text: {0}")]
    Format(#[from] FormatError),

    #[error("audit sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("invalid call: {message}")]
    Programmer { message: String },
}

impl PluginError {
    /// Invalid call-time arguments. Unrecoverable by retry.
    pub fn programmer<S: Into<String>>(message: S) -> Self {
        Self::Programmer {
            message: message.into(),
        }
    }

    /// Whether this error is unrecoverable misconfiguration rather than a
    /// transient condition worth retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Programmer { .. })
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
