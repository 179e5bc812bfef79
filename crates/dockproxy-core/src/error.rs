//! Error types for the dockproxy system
//!
//! This module defines the pass-level error taxonomy. Per-container
//! resolution failures live in [`crate::intent::ResolveError`] because the
//! controller recovers from them locally instead of failing a pass.

use crate::conflict::ConflictError;
use thiserror::Error;

/// Result type alias for dockproxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the dockproxy system
#[derive(Error, Debug)]
pub enum Error {
    /// Container runtime errors (connect, enumerate, inspect)
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// The lifecycle event subscription terminated
    #[error("Event stream error: {0}")]
    EventStream(String),

    /// Two containers claimed the same exclusive key
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Document store errors (read, temp write, atomic replace)
    #[error("Document store error: {0}")]
    Store(String),

    /// The proxy engine rejected the configuration on disk
    #[error("{engine} config invalid: {message}\nOutput: {output}")]
    Validation {
        /// Engine name
        engine: String,
        /// Short failure reason (exit status or spawn error)
        message: String,
        /// Combined command output, verbatim
        output: String,
    },

    /// The proxy engine failed to reload
    #[error("{engine} reload failed: {message}\nOutput: {output}")]
    Reload {
        /// Engine name
        engine: String,
        /// Short failure reason (exit status or spawn error)
        message: String,
        /// Combined command output, verbatim
        output: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Work abandoned because shutdown was requested
    #[error("Cancelled: shutdown requested")]
    Cancelled,
}

impl Error {
    /// Create a container runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create an event stream error
    pub fn event_stream(msg: impl Into<String>) -> Self {
        Self::EventStream(msg.into())
    }

    /// Create a document store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation failure carrying the engine's output
    pub fn validation(
        engine: impl Into<String>,
        message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Validation {
            engine: engine.into(),
            message: message.into(),
            output: output.into(),
        }
    }

    /// Create a reload failure carrying the engine's output
    pub fn reload(
        engine: impl Into<String>,
        message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Reload {
            engine: engine.into(),
            message: message.into(),
            output: output.into(),
        }
    }

    /// Whether this error must stop the watch loop
    ///
    /// Only a terminated event stream is fatal; every other failure aborts
    /// the current pass and the controller waits for the next trigger.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EventStream(_))
    }
}
