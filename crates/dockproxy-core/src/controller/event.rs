//! Controller observability types

use std::fmt;

use crate::traits::{CommitResult, ContainerEventKind};

/// Where the controller loop currently is
///
/// Published through a `tokio::sync::watch` channel; see
/// [`super::ReconcileController::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Waiting for a container event
    Idle,
    /// An event arrived; the debounce timer is armed
    DebouncePending,
    /// A reconciliation pass is running
    Reconciling,
    /// Shutdown requested or the event stream ended
    ShuttingDown,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::DebouncePending => "debounce-pending",
            Self::Reconciling => "reconciling",
            Self::ShuttingDown => "shutting-down",
        };
        f.write_str(s)
    }
}

/// Events emitted by the ReconcileController
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Controller started
    Started {
        runtime: String,
        engine: String,
    },

    /// A container lifecycle event was received
    EventReceived {
        kind: ContainerEventKind,
        container: String,
    },

    /// A reconciliation pass started
    ReconcileStarted,

    /// A reconciliation pass completed
    ReconcileSucceeded {
        /// Whether any document was replaced (and the engine reloaded)
        changed: bool,
        targets: usize,
        skipped: usize,
    },

    /// A reconciliation pass failed
    ReconcileFailed {
        error: String,
    },

    /// Controller stopped
    Stopped {
        reason: String,
    },
}

/// Result of resolving, validating, rendering and committing one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Containers that resolved to a routing intent
    pub targets: usize,
    /// Containers left out because of a per-container error
    pub skipped: usize,
    /// Stream document commit
    pub stream: CommitResult,
    /// HTTP document commit
    pub http: CommitResult,
}

impl SyncOutcome {
    /// Whether either document was replaced
    pub fn changed(&self) -> bool {
        self.stream.changed || self.http.changed
    }
}
