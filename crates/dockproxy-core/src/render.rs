//! Configuration rendering
//!
//! Pure transform from a [`ValidatedIntents`] set to the two nginx
//! documents. Output depends only on the claims, never on enumeration order
//! or wall-clock time, so an unchanged container set renders byte-identical
//! documents and the store can skip the write.
//!
//! ## Stream document
//!
//! ```text
//! upstream tcp_80 {
//!     server 172.17.0.2:8080;
//! }
//!
//! server {
//!     listen 80;
//!     proxy_pass tcp_80;
//! }
//! ```
//!
//! ## HTTP document
//!
//! One upstream per container, named after its first hostname, and one
//! `server` block per hostname pointing at it.

use std::fmt::Write as _;

use crate::conflict::ValidatedIntents;
use crate::fingerprint::Fingerprint;
use crate::intent::{Protocol, RoutingIntent};

/// Listener used for hostname routing by default
pub const HTTP_LISTEN: &str = "listen 80;";
/// Listener used when a container sets the secure flag
pub const HTTPS_LISTEN: &str = "listen 443 ssl;";

const STREAM_HEADER: &str = "\
# Generated by dockproxy from container labels. Do not edit by hand.
# Stream module: raw TCP/UDP forwarding keyed by port.
";

const HTTP_HEADER: &str = "\
# Generated by dockproxy from container labels. Do not edit by hand.
# HTTP module: hostname-based forwarding.
";

/// An immutable rendered document and its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    text: String,
    fingerprint: Fingerprint,
}

impl RenderedDocument {
    /// Wrap rendered text, fingerprinting its bytes
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = Fingerprint::of(text.as_bytes());
        Self { text, fingerprint }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Both documents of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSet {
    pub stream: RenderedDocument,
    pub http: RenderedDocument,
}

/// Render both documents
pub fn render(intents: &ValidatedIntents) -> RenderedSet {
    let ordered = ordered(intents);
    RenderedSet {
        stream: RenderedDocument::new(render_stream(&ordered)),
        http: RenderedDocument::new(render_http(&ordered)),
    }
}

/// Backend grouping identifier for a hostname
///
/// Every character other than an ASCII letter or digit becomes `_`, the
/// result is lower-cased and prefixed with `http_`.
///
/// # Examples
///
/// ```
/// use dockproxy_core::render::upstream_name;
///
/// assert_eq!(upstream_name("My-API.example.com"), "http_my_api_example_com");
/// ```
pub fn upstream_name(hostname: &str) -> String {
    let ident: String = hostname
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("http_{ident}")
}

fn stream_upstream_name(protocol: Protocol, proxy_port: u16) -> String {
    match protocol {
        Protocol::Tcp => format!("tcp_{proxy_port}"),
        Protocol::Udp => format!("udp_{proxy_port}"),
    }
}

fn ordered(intents: &ValidatedIntents) -> Vec<&RoutingIntent> {
    let mut ordered: Vec<&RoutingIntent> = intents.intents().iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    ordered
}

// `write!` into a String cannot fail; the results below are discarded.

fn render_stream(intents: &[&RoutingIntent]) -> String {
    let mut out = String::from(STREAM_HEADER);

    for intent in intents.iter().filter(|i| !i.ports.is_empty()) {
        let mut claims = intent.ports.clone();
        claims.sort_by_key(|c| (c.protocol, c.proxy_port));

        let _ = write!(out, "\n# container: {} ({})\n", intent.name, intent.id);

        for (index, claim) in claims.into_iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let upstream = stream_upstream_name(claim.protocol, claim.proxy_port);
            let listen = match claim.protocol {
                Protocol::Tcp => format!("listen {};", claim.proxy_port),
                Protocol::Udp => format!("listen {} udp;", claim.proxy_port),
            };

            let _ = write!(
                out,
                "upstream {upstream} {{\n    server {};\n}}\n\n\
                 server {{\n    {listen}\n    proxy_pass {upstream};\n}}\n",
                intent.backend(claim.container_port)
            );
        }
    }

    out
}

fn render_http(intents: &[&RoutingIntent]) -> String {
    let mut out = String::from(HTTP_HEADER);

    for intent in intents {
        let Some(host) = &intent.host else { continue };
        let Some(first) = host.hostnames.first() else {
            continue;
        };

        let upstream = upstream_name(first);
        let listen = if host.use_secure_listener {
            HTTPS_LISTEN
        } else {
            HTTP_LISTEN
        };

        let _ = write!(
            out,
            "\n# container: {} ({})\nupstream {upstream} {{\n    server {};\n}}\n",
            intent.name,
            intent.id,
            intent.backend(host.container_port)
        );

        for hostname in &host.hostnames {
            let _ = write!(
                out,
                "\nserver {{\n    {listen}\n    server_name {hostname};\n\n    \
                 location / {{\n        proxy_pass http://{upstream};\n        \
                 proxy_set_header Host $host;\n        \
                 proxy_set_header X-Real-IP $remote_addr;\n        \
                 proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n        \
                 proxy_set_header X-Forwarded-Proto $scheme;\n    }}\n}}\n"
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::validate_conflicts;
    use crate::intent::{HostClaim, PortClaim};
    use std::net::IpAddr;

    fn claim(proxy_port: u16, container_port: u16, protocol: Protocol) -> PortClaim {
        PortClaim {
            proxy_port,
            container_port,
            protocol,
        }
    }

    fn web_intent() -> RoutingIntent {
        RoutingIntent {
            name: "web".to_string(),
            id: "abc123def456".to_string(),
            address: IpAddr::from([172, 17, 0, 2]),
            ports: vec![
                claim(80, 8080, Protocol::Tcp),
                claim(443, 8443, Protocol::Tcp),
                claim(53, 53, Protocol::Udp),
            ],
            host: None,
        }
    }

    fn api_intent() -> RoutingIntent {
        RoutingIntent {
            name: "api".to_string(),
            id: "def456abc123".to_string(),
            address: IpAddr::from([172, 17, 0, 3]),
            ports: Vec::new(),
            host: Some(HostClaim {
                hostnames: vec!["api.example.com".to_string(), "api.test.com".to_string()],
                container_port: 8080,
                use_secure_listener: false,
            }),
        }
    }

    #[test]
    fn test_stream_document_for_tcp_and_udp() {
        let set = render(&validate_conflicts(vec![web_intent()]).unwrap());
        let text = set.stream.text();

        assert!(text.contains("upstream tcp_80 {\n    server 172.17.0.2:8080;\n}"));
        assert!(text.contains("upstream tcp_443 {\n    server 172.17.0.2:8443;\n}"));
        assert!(text.contains("upstream udp_53 {\n    server 172.17.0.2:53;\n}"));
        assert!(text.contains("listen 80;\n    proxy_pass tcp_80;"));
        assert!(text.contains("listen 443;\n    proxy_pass tcp_443;"));
        assert!(text.contains("listen 53 udp;\n    proxy_pass udp_53;"));
        assert_eq!(text.matches("upstream ").count(), 3);
        assert_eq!(text.matches("server {").count(), 3);

        assert!(!set.http.text().contains("upstream"));
    }

    #[test]
    fn test_http_document_shares_one_upstream() {
        let set = render(&validate_conflicts(vec![api_intent()]).unwrap());
        let text = set.http.text();

        assert_eq!(text.matches("upstream ").count(), 1);
        assert!(text.contains("upstream http_api_example_com {\n    server 172.17.0.3:8080;\n}"));
        assert!(text.contains("server_name api.example.com;"));
        assert!(text.contains("server_name api.test.com;"));
        assert_eq!(
            text.matches("proxy_pass http://http_api_example_com;").count(),
            2
        );
        assert_eq!(text.matches(HTTP_LISTEN).count(), 2);
        assert!(!text.contains(HTTPS_LISTEN));
    }

    #[test]
    fn test_secure_listener() {
        let mut intent = api_intent();
        if let Some(host) = intent.host.as_mut() {
            host.use_secure_listener = true;
        }
        let set = render(&validate_conflicts(vec![intent]).unwrap());
        assert!(set.http.text().contains("listen 443 ssl;"));
        assert!(!set.http.text().contains(HTTP_LISTEN));
    }

    #[test]
    fn test_empty_set_renders_minimal_documents() {
        let set = render(&ValidatedIntents::default());

        for text in [set.stream.text(), set.http.text()] {
            assert!(!text.contains("upstream"));
            assert!(!text.contains("server"));
            assert!(!text.contains("listen"));
            assert!(!text.is_empty());
        }
    }

    #[test]
    fn test_render_is_order_independent() {
        let a = render(&validate_conflicts(vec![web_intent(), api_intent()]).unwrap());
        let b = render(&validate_conflicts(vec![api_intent(), web_intent()]).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.stream.fingerprint(), b.stream.fingerprint());
    }

    #[test]
    fn test_fingerprint_matches_bytes() {
        let set = render(&validate_conflicts(vec![web_intent()]).unwrap());
        assert_eq!(
            set.stream.fingerprint(),
            Fingerprint::of(set.stream.as_bytes())
        );
    }

    #[test]
    fn test_upstream_name() {
        assert_eq!(upstream_name("api.example.com"), "http_api_example_com");
        assert_eq!(
            upstream_name("my-api.test-domain.com"),
            "http_my_api_test_domain_com"
        );
        assert_eq!(upstream_name("localhost"), "http_localhost");
        assert_eq!(upstream_name("192.168.1.1"), "http_192_168_1_1");
        assert_eq!(upstream_name("*.Example.COM"), "http___example_com");
    }

    #[test]
    fn test_ipv6_backend_is_bracketed() {
        let mut intent = web_intent();
        intent.address = "fd00::5".parse().unwrap();
        let set = render(&validate_conflicts(vec![intent]).unwrap());
        assert!(set.stream.text().contains("server [fd00::5]:8080;"));
    }
}
