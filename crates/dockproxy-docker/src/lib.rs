// # Docker Container Runtime
//
// This crate provides the Docker Engine implementation of `ContainerRuntime`.
//
// ## Responsibilities
//
// - Enumerate running containers and inspect each for labels and address
// - Subscribe to container start/stop/die events and normalize them
// - Provision the shared proxy network on request
//
// ## Address Discovery
//
// The primary address is the container's default-bridge address when it
// has one. Otherwise the first address found on its attached networks,
// visited in network-name order, is used so the choice is stable.
//
// ## Event Subscription
//
// One background task per `watch()` call forwards Docker events into a
// bounded channel. The task exits when the token is cancelled, when the
// receiver is dropped, or after forwarding the single terminal error.

use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum, NetworkSettings};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::system::EventsOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use chrono::{DateTime, Utc};
use dockproxy_core::traits::{
    ContainerEvent, ContainerEventKind, ContainerEventStream, ContainerRuntime,
    ContainerSnapshot, short_id,
};
use dockproxy_core::{Error, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Seconds to wait on a Docker API request
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Driver used when creating the proxy network
const NETWORK_DRIVER: &str = "bridge";

/// Docker Engine container runtime
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    event_buffer: usize,
}

impl DockerRuntime {
    /// Connect to the Docker daemon and verify it answers
    ///
    /// `host` accepts `unix://`, `tcp://` and `http://` endpoints; an empty
    /// string uses the client's local defaults (`DOCKER_HOST` or the
    /// platform socket).
    pub async fn connect(host: &str, event_buffer: usize) -> Result<Self> {
        let docker = Self::client(host)?;

        let version = docker
            .ping()
            .await
            .map_err(|e| Error::runtime(format!("Docker daemon at {host} is unreachable: {e}")))?;
        info!("connected to Docker daemon host={} ping={}", host, version);

        Ok(Self {
            docker,
            event_buffer: event_buffer.max(1),
        })
    }

    fn client(host: &str) -> Result<Docker> {
        let host = host.trim();

        let connected = if host.is_empty() {
            Docker::connect_with_local_defaults()
        } else if host.starts_with("unix://") {
            Self::unix_client(host)?
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            return Err(Error::config(format!(
                "unsupported Docker host {host:?}: expected unix://, tcp:// or http://"
            )));
        };

        connected.map_err(|e| Error::runtime(format!("failed to create Docker client: {e}")))
    }

    #[cfg(unix)]
    fn unix_client(host: &str) -> Result<std::result::Result<Docker, BollardError>> {
        Ok(Docker::connect_with_unix(
            host,
            REQUEST_TIMEOUT_SECS,
            API_DEFAULT_VERSION,
        ))
    }

    #[cfg(not(unix))]
    fn unix_client(host: &str) -> Result<std::result::Result<Docker, BollardError>> {
        Err(Error::config(format!(
            "unix socket Docker host {host:?} is not supported on this platform"
        )))
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::runtime(format!("failed to list containers: {e}")))?;

        let mut snapshots = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };

            match self
                .docker
                .inspect_container(&id, None::<InspectContainerOptions>)
                .await
            {
                Ok(details) => snapshots.push(snapshot_from_inspect(&id, details)),
                Err(e) => {
                    warn!("failed to inspect container id={}: {}", short_id(&id), e);
                }
            }
        }

        Ok(snapshots)
    }

    fn watch(&self, cancel: CancellationToken) -> ContainerEventStream {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let docker = self.docker.clone();

        tokio::spawn(async move {
            forward_events(docker, tx, cancel).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => {
                debug!("network {} already exists", name);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                let options = CreateNetworkOptions {
                    name: name.to_string(),
                    driver: NETWORK_DRIVER.to_string(),
                    ..Default::default()
                };
                self.docker
                    .create_network(options)
                    .await
                    .map_err(|e| Error::runtime(format!("failed to create network {name}: {e}")))?;
                info!("created network name={} driver={}", name, NETWORK_DRIVER);
                Ok(())
            }
            Err(e) => Err(Error::runtime(format!(
                "failed to inspect network {name}: {e}"
            ))),
        }
    }

    fn runtime_name(&self) -> &'static str {
        "docker"
    }
}

/// Pump Docker events into the controller's channel until told to stop
async fn forward_events(
    docker: Docker,
    tx: mpsc::Sender<Result<ContainerEvent>>,
    cancel: CancellationToken,
) {
    let mut filters = HashMap::new();
    filters.insert("type".to_string(), vec!["container".to_string()]);
    filters.insert(
        "event".to_string(),
        ContainerEventKind::ALL
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
    );

    let mut stream = Box::pin(docker.events(Some(EventsOptions::<String> {
        filters,
        ..Default::default()
    })));
    debug!("subscribed to Docker container events");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Docker event subscription cancelled");
                return;
            }
            item = stream.next() => item,
        };

        let outgoing = match item {
            Some(Ok(message)) => match normalize_event(&message) {
                Some(event) => Ok(event),
                None => continue,
            },
            Some(Err(e)) => Err(Error::event_stream(format!("Docker event stream failed: {e}"))),
            None => Err(Error::event_stream("Docker event stream closed")),
        };
        let terminal = outgoing.is_err();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(outgoing) => {
                if sent.is_err() {
                    debug!("event receiver dropped, stopping subscription");
                    return;
                }
            }
        }

        if terminal {
            return;
        }
    }
}

/// Convert a Docker event into a controller event
///
/// Returns `None` for anything other than a container start/stop/die with
/// an actor id.
pub fn normalize_event(message: &EventMessage) -> Option<ContainerEvent> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }

    let kind: ContainerEventKind = message.action.as_deref()?.parse().ok()?;
    let actor = message.actor.as_ref()?;
    let id = actor.id.as_deref().filter(|id| !id.is_empty())?;

    let name = actor
        .attributes
        .as_ref()
        .and_then(|attrs| attrs.get("name"))
        .map(String::as_str)
        .unwrap_or_else(|| short_id(id));

    Some(ContainerEvent::new(kind, id, name, event_time(message)))
}

fn event_time(message: &EventMessage) -> DateTime<Utc> {
    if let Some(nanos) = message.time_nano {
        return DateTime::from_timestamp_nanos(nanos);
    }
    message
        .time
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

fn snapshot_from_inspect(id: &str, details: ContainerInspectResponse) -> ContainerSnapshot {
    let name = details
        .name
        .as_deref()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| short_id(id).to_string());
    let ip = details.network_settings.as_ref().and_then(primary_ip);

    let mut snapshot = ContainerSnapshot::new(id, name, ip);
    if let Some(labels) = details.config.and_then(|config| config.labels) {
        snapshot.labels = labels;
    }
    snapshot
}

/// Pick the container's primary address
pub fn primary_ip(settings: &NetworkSettings) -> Option<IpAddr> {
    if let Some(ip) = settings.ip_address.as_deref().and_then(parse_ip) {
        return Some(ip);
    }

    let networks = settings.networks.as_ref()?;
    let mut names: Vec<&String> = networks.keys().collect();
    names.sort();

    names.into_iter().find_map(|name| {
        networks
            .get(name)
            .and_then(|endpoint| endpoint.ip_address.as_deref())
            .and_then(parse_ip)
    })
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}
