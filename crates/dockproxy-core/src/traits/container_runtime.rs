// # Container Runtime Trait
//
// Defines the interface the controller uses to enumerate live containers
// and to subscribe to their lifecycle events.
//
// ## Implementations
//
// - Docker Engine API: `dockproxy-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use dockproxy_core::ContainerRuntime;
// use tokio_stream::StreamExt;
// use tokio_util::sync::CancellationToken;
//
// #[tokio::main]
// async fn main() -> dockproxy_core::Result<()> {
//     let runtime = /* ContainerRuntime implementation */;
//
//     // Snapshot of every running container
//     let containers = runtime.list_containers().await?;
//
//     // Lifecycle events until cancelled or the stream fails
//     let mut events = runtime.watch(CancellationToken::new());
//     while let Some(event) = events.next().await {
//         println!("event: {:?}", event?);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Length of the truncated container identifier used in logs and documents
pub const SHORT_ID_LEN: usize = 12;

/// Truncate a runtime container identifier to its short form
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Point-in-time view of one running container
///
/// Produced by [`ContainerRuntime::list_containers`] on every pass; the
/// controller never caches these across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// Full runtime identifier
    pub id: String,
    /// Stable container name, without the leading `/`
    pub name: String,
    /// Container labels
    pub labels: HashMap<String, String>,
    /// Primary IP address, if the runtime could determine one
    pub ip: Option<IpAddr>,
}

impl ContainerSnapshot {
    /// Create a snapshot with no labels
    pub fn new(id: impl Into<String>, name: impl Into<String>, ip: Option<IpAddr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            labels: HashMap::new(),
            ip,
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Container lifecycle transitions the controller subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerEventKind {
    Start,
    Stop,
    Die,
}

impl ContainerEventKind {
    /// All kinds, in the order used for runtime subscription filters
    pub const ALL: [ContainerEventKind; 3] = [Self::Start, Self::Stop, Self::Die];

    /// Runtime action name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
        }
    }
}

impl fmt::Display for ContainerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerEventKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "die" => Ok(Self::Die),
            other => Err(crate::Error::runtime(format!(
                "unsupported container event action: {other}"
            ))),
        }
    }
}

/// Normalized container lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// What happened
    pub kind: ContainerEventKind,
    /// Truncated container identifier
    pub container_id: String,
    /// Container name, without the leading `/`
    pub name: String,
    /// When the runtime observed the event
    pub timestamp: DateTime<Utc>,
}

impl ContainerEvent {
    /// Create a new event
    ///
    /// The identifier is truncated to its short form.
    pub fn new(
        kind: ContainerEventKind,
        container_id: &str,
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            container_id: short_id(container_id).to_string(),
            name: name.into().trim_start_matches('/').to_string(),
            timestamp,
        }
    }
}

/// Stream of normalized events
///
/// An `Err` item is the terminal error signal: implementations emit at most
/// one and end the stream right after it.
pub type ContainerEventStream =
    Pin<Box<dyn Stream<Item = crate::Result<ContainerEvent>> + Send + 'static>>;

/// Trait for container runtime implementations
///
/// The runtime is an observer. It enumerates and reports; it never decides
/// when a reconciliation pass runs.
///
/// ## Task Spawning Rules
///
/// [`ContainerRuntime::watch`] may spawn exactly one background task that
/// forwards runtime notifications into a buffered channel. That task must
/// exit when the supplied [`CancellationToken`] is cancelled or when the
/// receiving side is dropped.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Enumerate running containers
    ///
    /// Containers whose details cannot be fetched are logged and left out;
    /// only a failure to list at all is an error.
    async fn list_containers(&self) -> crate::Result<Vec<ContainerSnapshot>>;

    /// Subscribe to start/stop/die events
    ///
    /// Returns immediately. Events are buffered so that a slow consumer
    /// does not stall the subscription.
    fn watch(&self, cancel: CancellationToken) -> ContainerEventStream;

    /// Make sure the shared proxy network exists
    ///
    /// Runtimes without network management keep the default no-op.
    async fn ensure_network(&self, _name: &str) -> crate::Result<()> {
        Ok(())
    }

    /// Runtime name for logs
    fn runtime_name(&self) -> &'static str;
}
