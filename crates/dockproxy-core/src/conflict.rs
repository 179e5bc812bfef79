//! Exclusive-claim conflict detection
//!
//! Four independent claim spaces exist: TCP ports, UDP ports, hostnames and
//! HTTP upstream names. Within a space the first container to claim a key
//! owns it and any later claim fails the whole pass. Stream and hostname
//! claims never meet, so a container may hold port 80 in the stream module
//! while another serves HTTP hostnames on port 80.
//!
//! Hostnames are compared case-insensitively. Upstream names are derived
//! from each container's first hostname, so `a-b.example.com` and
//! `a.b.example.com` on different containers collide there even though the
//! hostnames differ.

use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::intent::{Protocol, RoutingIntent};
use crate::render::upstream_name;

/// A claim space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimSpace {
    TcpPort,
    UdpPort,
    Hostname,
    Upstream,
}

impl fmt::Display for ClaimSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimSpace::TcpPort => f.write_str("TCP port"),
            ClaimSpace::UdpPort => f.write_str("UDP port"),
            ClaimSpace::Hostname => f.write_str("HTTP hostname"),
            ClaimSpace::Upstream => f.write_str("HTTP upstream"),
        }
    }
}

/// Two containers claimed the same key in one space
///
/// `existing` and `incoming` depend on enumeration order, which the runtime
/// does not guarantee. Compare them as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictError {
    pub space: ClaimSpace,
    /// The contested port number, hostname or upstream name
    pub key: String,
    /// Container that claimed the key first
    pub existing: String,
    /// Container whose claim collided
    pub incoming: String,
}

impl ConflictError {
    /// Both claimant names, sorted
    pub fn claimants(&self) -> [&str; 2] {
        let mut names = [self.existing.as_str(), self.incoming.as_str()];
        names.sort_unstable();
        names
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.space {
            ClaimSpace::Hostname | ClaimSpace::Upstream => write!(
                f,
                "{} conflict: {} claimed by both {} and {}",
                self.space, self.key, self.existing, self.incoming
            ),
            ClaimSpace::TcpPort | ClaimSpace::UdpPort => write!(
                f,
                "{} conflict: port {} claimed by both {} and {}",
                self.space, self.key, self.existing, self.incoming
            ),
        }
    }
}

impl std::error::Error for ConflictError {}

/// An intent set with no conflicting claims
///
/// Only [`validate_conflicts`] builds one, so the renderer can rely on
/// every port, hostname and upstream name appearing exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedIntents {
    intents: Vec<RoutingIntent>,
}

impl ValidatedIntents {
    /// The intents, in the order they were validated
    pub fn intents(&self) -> &[RoutingIntent] {
        &self.intents
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// First-claimant-wins registry for one space
struct ClaimTable<K> {
    space: ClaimSpace,
    owners: HashMap<K, String>,
}

impl<K: std::hash::Hash + Eq + fmt::Display> ClaimTable<K> {
    fn new(space: ClaimSpace) -> Self {
        Self {
            space,
            owners: HashMap::new(),
        }
    }

    fn claim(&mut self, key: K, owner: &str) -> Result<(), ConflictError> {
        if let Some(existing) = self.owners.get(&key) {
            return Err(ConflictError {
                space: self.space,
                key: key.to_string(),
                existing: existing.clone(),
                incoming: owner.to_string(),
            });
        }
        self.owners.insert(key, owner.to_string());
        Ok(())
    }
}

/// Check every claim of a pass for collisions
///
/// Claims are folded in the given order. The first collision found aborts
/// validation and nothing is returned, so no partial set can reach the
/// renderer.
pub fn validate_conflicts(intents: Vec<RoutingIntent>) -> Result<ValidatedIntents, ConflictError> {
    let mut tcp = ClaimTable::new(ClaimSpace::TcpPort);
    let mut udp = ClaimTable::new(ClaimSpace::UdpPort);
    let mut hosts = ClaimTable::new(ClaimSpace::Hostname);
    let mut upstreams = ClaimTable::new(ClaimSpace::Upstream);

    for intent in &intents {
        for claim in &intent.ports {
            let table = match claim.protocol {
                Protocol::Tcp => &mut tcp,
                Protocol::Udp => &mut udp,
            };
            table.claim(claim.proxy_port, &intent.name)?;
        }

        if let Some(host) = &intent.host {
            for hostname in &host.hostnames {
                hosts.claim(hostname.to_ascii_lowercase(), &intent.name)?;
            }
            if let Some(first) = host.hostnames.first() {
                upstreams.claim(upstream_name(first), &intent.name)?;
            }
        }
    }

    debug!(
        "validation passed tcp_ports={} udp_ports={} http_hosts={}",
        tcp.owners.len(),
        udp.owners.len(),
        hosts.owners.len()
    );

    Ok(ValidatedIntents { intents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{HostClaim, PortClaim};
    use std::net::IpAddr;

    fn stream(name: &str, claims: &[(u16, u16, Protocol)]) -> RoutingIntent {
        RoutingIntent {
            name: name.to_string(),
            id: format!("{name}-id"),
            address: IpAddr::from([172, 17, 0, 2]),
            ports: claims
                .iter()
                .map(|&(proxy_port, container_port, protocol)| PortClaim {
                    proxy_port,
                    container_port,
                    protocol,
                })
                .collect(),
            host: None,
        }
    }

    fn hosts(name: &str, hostnames: &[&str]) -> RoutingIntent {
        RoutingIntent {
            name: name.to_string(),
            id: format!("{name}-id"),
            address: IpAddr::from([172, 17, 0, 3]),
            ports: Vec::new(),
            host: Some(HostClaim {
                hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
                container_port: 80,
                use_secure_listener: false,
            }),
        }
    }

    #[test]
    fn test_no_conflicts() {
        let validated = validate_conflicts(vec![
            stream("web", &[(80, 8080, Protocol::Tcp)]),
            stream("dns", &[(53, 53, Protocol::Udp)]),
        ])
        .unwrap();
        assert_eq!(validated.len(), 2);
    }

    #[test]
    fn test_tcp_port_conflict() {
        let err = validate_conflicts(vec![
            stream("web1", &[(80, 8080, Protocol::Tcp)]),
            stream("web2", &[(80, 3000, Protocol::Tcp)]),
        ])
        .unwrap_err();

        assert_eq!(err.space, ClaimSpace::TcpPort);
        assert_eq!(err.key, "80");
        assert_eq!(err.claimants(), ["web1", "web2"]);
        assert!(err.to_string().contains("TCP port conflict: port 80"));
    }

    #[test]
    fn test_udp_port_conflict() {
        let err = validate_conflicts(vec![
            stream("dns1", &[(53, 53, Protocol::Udp)]),
            stream("dns2", &[(53, 5353, Protocol::Udp)]),
        ])
        .unwrap_err();
        assert_eq!(err.space, ClaimSpace::UdpPort);
        assert!(err.to_string().contains("UDP port conflict: port 53"));
    }

    #[test]
    fn test_same_port_different_protocols() {
        assert!(
            validate_conflicts(vec![
                stream("dns-tcp", &[(53, 53, Protocol::Tcp)]),
                stream("dns-udp", &[(53, 53, Protocol::Udp)]),
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_stream_and_hostname_modules_do_not_conflict() {
        let mut http = hosts("web-http", &["web.example.com"]);
        if let Some(host) = http.host.as_mut() {
            host.container_port = 80;
        }
        assert!(
            validate_conflicts(vec![stream("web-tcp", &[(80, 8080, Protocol::Tcp)]), http])
                .is_ok()
        );
    }

    #[test]
    fn test_shared_hostname_among_distinct_ones() {
        let err = validate_conflicts(vec![
            hosts("api1", &["a.example.com", "shared.example.com"]),
            hosts("api2", &["b.example.com", "shared.example.com"]),
        ])
        .unwrap_err();

        assert_eq!(err.space, ClaimSpace::Hostname);
        assert_eq!(err.key, "shared.example.com");
        assert_eq!(err.claimants(), ["api1", "api2"]);
        assert!(
            err.to_string()
                .contains("HTTP hostname conflict: shared.example.com")
        );
    }

    #[test]
    fn test_hostname_case_is_ignored() {
        let err = validate_conflicts(vec![
            hosts("api1", &["API.example.com"]),
            hosts("api2", &["api.example.com"]),
        ])
        .unwrap_err();

        assert_eq!(err.space, ClaimSpace::Hostname);
        assert_eq!(err.key, "api.example.com");
    }

    #[test]
    fn test_upstream_name_collision() {
        // Distinct hostnames that map to the same http_ identifier
        let err = validate_conflicts(vec![
            hosts("dashed", &["a-b.example.com"]),
            hosts("dotted", &["a.b.example.com"]),
        ])
        .unwrap_err();

        assert_eq!(err.space, ClaimSpace::Upstream);
        assert_eq!(err.key, "http_a_b_example_com");
        assert_eq!(err.claimants(), ["dashed", "dotted"]);
        assert!(
            err.to_string()
                .contains("HTTP upstream conflict: http_a_b_example_com")
        );
    }

    #[test]
    fn test_upstream_names_only_from_first_hostname() {
        // Later hostnames share their container's upstream and never claim one
        assert!(
            validate_conflicts(vec![
                hosts("site", &["site.example.com", "a-b.example.com"]),
                hosts("other", &["a.b.example.com"]),
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_detection_independent_of_order() {
        let a = stream("a", &[(443, 8443, Protocol::Tcp)]);
        let b = stream("b", &[(443, 9443, Protocol::Tcp)]);

        let forward = validate_conflicts(vec![a.clone(), b.clone()]).unwrap_err();
        let reverse = validate_conflicts(vec![b, a]).unwrap_err();
        assert_eq!(forward.claimants(), reverse.claimants());
        assert_eq!(forward.key, reverse.key);
    }

    #[test]
    fn test_empty_set_is_valid() {
        assert!(validate_conflicts(Vec::new()).unwrap().is_empty());
    }
}
