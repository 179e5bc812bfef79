//! Label value parsers
//!
//! Pure string parsing for the port and hostname labels. Every parser is
//! all-or-nothing: a single bad token rejects the whole value.

use thiserror::Error;

/// Why a port specification was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortSpecError {
    /// More than one `:` in a single specification
    #[error("invalid port mapping format: {0:?}")]
    TooManyColons(String),

    /// A token that is not an integer
    #[error("invalid port {0:?}: not an integer")]
    NotANumber(String),

    /// An integer outside `[1, 65535]`
    #[error("port {0} out of range")]
    OutOfRange(i64),
}

/// One parsed `proxyPort[:containerPort]` specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub proxy_port: u16,
    pub container_port: u16,
}

/// Parse a single port number, trimming surrounding whitespace
pub fn parse_port(token: &str) -> Result<u16, PortSpecError> {
    let token = token.trim();
    let value: i64 = token
        .parse()
        .map_err(|_| PortSpecError::NotANumber(token.to_string()))?;

    if !(1..=i64::from(u16::MAX)).contains(&value) {
        return Err(PortSpecError::OutOfRange(value));
    }

    u16::try_from(value).map_err(|_| PortSpecError::OutOfRange(value))
}

/// Parse a comma-separated list of port specifications
///
/// Each entry is `port` (same port on both sides) or
/// `proxyPort:containerPort`. Whitespace around entries and around the
/// colon is ignored; empty entries such as a trailing comma are skipped.
///
/// # Examples
///
/// ```
/// use dockproxy_core::intent::parse::parse_port_specs;
///
/// let specs = parse_port_specs("80:8080, 53").unwrap();
/// assert_eq!(specs[0].proxy_port, 80);
/// assert_eq!(specs[0].container_port, 8080);
/// assert_eq!(specs[1].container_port, 53);
///
/// assert!(parse_port_specs("80:8080:9090").is_err());
/// ```
pub fn parse_port_specs(value: &str) -> Result<Vec<PortSpec>, PortSpecError> {
    let mut specs = Vec::new();

    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let spec = match part.split_once(':') {
            Some((_, rest)) if rest.contains(':') => {
                return Err(PortSpecError::TooManyColons(part.to_string()));
            }
            Some((proxy, container)) => PortSpec {
                proxy_port: parse_port(proxy)?,
                container_port: parse_port(container)?,
            },
            None => {
                let port = parse_port(part)?;
                PortSpec {
                    proxy_port: port,
                    container_port: port,
                }
            }
        };
        specs.push(spec);
    }

    Ok(specs)
}

/// Split a comma-separated hostname list
///
/// Tokens are trimmed, empty tokens dropped, and repeated hostnames
/// collapsed to their first occurrence. An empty result is returned as-is;
/// the caller decides whether that is an error.
pub fn parse_hostnames(value: &str) -> Vec<String> {
    let mut hostnames: Vec<String> = Vec::new();

    for host in value.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        if !hostnames.iter().any(|existing| existing == host) {
            hostnames.push(host.to_string());
        }
    }

    hostnames
}

/// Interpret the secure-listener flag
///
/// Only a case-insensitive `true` enables it.
pub fn parse_secure_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}
