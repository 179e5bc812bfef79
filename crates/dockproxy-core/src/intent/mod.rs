//! Routing-intent resolution
//!
//! Turns one container's labels and address into a normalized
//! [`RoutingIntent`], or explains why the container cannot be proxied.
//! Resolution is pure: the caller supplies everything, nothing is fetched.
//!
//! ## Labels
//!
//! | Key | Format | Default |
//! |---|---|---|
//! | `proxy.tcp.ports` | `port` or `proxyPort:containerPort`, comma-separated | none |
//! | `proxy.udp.ports` | same format | none |
//! | `proxy.http.host` | comma-separated hostnames | none |
//! | `proxy.http.port` | integer | 80 |
//! | `proxy.http.https` | `true` / anything else | false |

pub mod parse;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing::debug;

use crate::traits::{ContainerSnapshot, short_id};
use parse::PortSpecError;

/// Stream TCP port label
pub const LABEL_TCP_PORTS: &str = "proxy.tcp.ports";
/// Stream UDP port label
pub const LABEL_UDP_PORTS: &str = "proxy.udp.ports";
/// Hostname list label
pub const LABEL_HTTP_HOST: &str = "proxy.http.host";
/// Hostname backend port label
pub const LABEL_HTTP_PORT: &str = "proxy.http.port";
/// Secure listener flag label
pub const LABEL_HTTP_HTTPS: &str = "proxy.http.https";

/// Backend port used when `proxy.http.port` is absent
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Transport protocol of a stream claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// A claim on one proxy port for stream forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortClaim {
    pub proxy_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// A claim on one or more hostnames for HTTP routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostClaim {
    /// Non-empty, trimmed, distinct, in label order
    pub hostnames: Vec<String>,
    pub container_port: u16,
    /// Listen on the secure alternate listener instead of the default one
    pub use_secure_listener: bool,
}

/// Everything one container asks the proxy to do
///
/// Built fresh every pass and dropped at the end of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingIntent {
    pub name: String,
    /// Truncated container identifier
    pub id: String,
    pub address: IpAddr,
    pub ports: Vec<PortClaim>,
    pub host: Option<HostClaim>,
}

impl RoutingIntent {
    /// Backend socket address for a container port
    pub fn backend(&self, container_port: u16) -> SocketAddr {
        SocketAddr::new(self.address, container_port)
    }

    /// Claims for one protocol, in label order
    pub fn ports_for(&self, protocol: Protocol) -> impl Iterator<Item = &PortClaim> {
        self.ports.iter().filter(move |p| p.protocol == protocol)
    }
}

/// Why a container produced no intent
///
/// Every variant is recovered locally: the container is left out of the
/// pass and the remaining containers are processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// None of the primary routing labels are set
    #[error("container {name} has no proxy labels")]
    NotATarget { name: String },

    /// The runtime reported no usable IP address
    #[error("container {name} has no IP address")]
    NoAddress { name: String },

    /// A port label could not be parsed; the whole port set is rejected
    #[error("container {name}: invalid {protocol} port mappings {value:?}: {source}")]
    InvalidPortSpec {
        name: String,
        protocol: Protocol,
        value: String,
        #[source]
        source: PortSpecError,
    },

    /// The hostname label held only separators and whitespace
    #[error("container {name}: hostname list {value:?} is empty")]
    EmptyHostnames { name: String, value: String },

    /// The hostname backend port label is not a valid port
    #[error("container {name}: invalid HTTP port {value:?}: {source}")]
    InvalidHostPort {
        name: String,
        value: String,
        #[source]
        source: PortSpecError,
    },
}

impl ResolveError {
    /// Whether this outcome is the ordinary "not proxied" case
    ///
    /// Callers skip these silently; everything else deserves a warning.
    pub fn is_silent(&self) -> bool {
        matches!(self, ResolveError::NotATarget { .. })
    }
}

/// Fetch a label, treating empty or whitespace-only values as absent
fn label<'a>(container: &'a ContainerSnapshot, key: &str) -> Option<&'a str> {
    container
        .labels
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

/// Resolve one container into a routing intent
///
/// # Returns
///
/// - `Ok(RoutingIntent)`: the container is a proxy target
/// - `Err(ResolveError::NotATarget)`: no routing labels, skip silently
/// - `Err(_)`: any other variant, skip the container with a warning
pub fn resolve(container: &ContainerSnapshot) -> Result<RoutingIntent, ResolveError> {
    let name = container.name.clone();

    let tcp = label(container, LABEL_TCP_PORTS);
    let udp = label(container, LABEL_UDP_PORTS);
    let host = label(container, LABEL_HTTP_HOST);

    if tcp.is_none() && udp.is_none() && host.is_none() {
        return Err(ResolveError::NotATarget { name });
    }

    let Some(address) = container.ip else {
        return Err(ResolveError::NoAddress { name });
    };

    let mut ports = Vec::new();
    for (protocol, value) in [(Protocol::Tcp, tcp), (Protocol::Udp, udp)] {
        let Some(value) = value else { continue };
        let specs =
            parse::parse_port_specs(value).map_err(|source| ResolveError::InvalidPortSpec {
                name: name.clone(),
                protocol,
                value: value.to_string(),
                source,
            })?;

        for spec in specs {
            debug!(
                "container={} parsed protocol={} proxy_port={} container_port={}",
                name, protocol, spec.proxy_port, spec.container_port
            );
            ports.push(PortClaim {
                proxy_port: spec.proxy_port,
                container_port: spec.container_port,
                protocol,
            });
        }
    }

    let host = match host {
        Some(value) => Some(resolve_host_claim(container, &name, value)?),
        None => None,
    };

    Ok(RoutingIntent {
        id: short_id(&container.id).to_string(),
        name,
        address,
        ports,
        host,
    })
}

fn resolve_host_claim(
    container: &ContainerSnapshot,
    name: &str,
    value: &str,
) -> Result<HostClaim, ResolveError> {
    let hostnames = parse::parse_hostnames(value);
    if hostnames.is_empty() {
        return Err(ResolveError::EmptyHostnames {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    let container_port = match label(container, LABEL_HTTP_PORT) {
        Some(raw) => parse::parse_port(raw).map_err(|source| ResolveError::InvalidHostPort {
            name: name.to_string(),
            value: raw.to_string(),
            source,
        })?,
        None => DEFAULT_HTTP_PORT,
    };

    let use_secure_listener = parse::parse_secure_flag(label(container, LABEL_HTTP_HTTPS));

    debug!(
        "container={} http_mapping hostnames={} port={} https={}",
        name,
        hostnames.len(),
        container_port,
        use_secure_listener
    );

    Ok(HostClaim {
        hostnames,
        container_port,
        use_secure_listener,
    })
}
