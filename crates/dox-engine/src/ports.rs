//! Port mapping parsing
//!
//! Accepts the mapping forms container engines understand:
//! `80`, `8080:80`, `127.0.0.1:8080:80`, `127.0.0.1::80`, `8080:80/udp`
//! and equal-length ranges such as `8000-8010:8000-8010`.

use crate::error::{Error, Result};
use std::fmt;
use std::ops::RangeInclusive;

/// One parsed port mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    host_ip: Option<String>,
    host_ports: Option<RangeInclusive<u16>>,
    container_ports: RangeInclusive<u16>,
    protocol: String,
}

/// A single host-to-container port pair, after range expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPair {
    /// Host address to bind, if restricted
    pub host_ip: Option<String>,
    /// Host port, `None` to let the engine choose
    pub host_port: Option<u16>,
    /// Container port
    pub container_port: u16,
    /// `tcp`, `udp` or `sctp`
    pub protocol: String,
}

impl PortPair {
    /// Key used by the engine API, e.g. `80/tcp`
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

impl PortBinding {
    /// Parse a mapping string
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |why: &str| Error::invalid_spec(format!("port mapping '{}': {}", spec, why));

        let (mapping, protocol) = match spec.trim().split_once('/') {
            Some((mapping, proto)) => (mapping, proto.to_lowercase()),
            None => (spec.trim(), "tcp".to_string()),
        };
        if !matches!(protocol.as_str(), "tcp" | "udp" | "sctp") {
            return Err(invalid("unsupported protocol"));
        }

        let mut parts: Vec<&str> = mapping.rsplitn(3, ':').collect();
        parts.reverse();
        let (host_ip, host_ports, container_ports) = match parts.as_slice() {
            [container] => (None, "", *container),
            [host, container] => (None, *host, *container),
            [ip, host, container] => (Some(*ip), *host, *container),
            _ => return Err(invalid("malformed")),
        };

        let container_ports = parse_range(container_ports).ok_or_else(|| invalid("bad container port"))?;
        let host_ports = if host_ports.is_empty() {
            None
        } else {
            Some(parse_range(host_ports).ok_or_else(|| invalid("bad host port"))?)
        };
        if let Some(host) = &host_ports {
            if host.len() != container_ports.len() {
                return Err(invalid("host and container ranges differ in length"));
            }
        }

        let host_ip = host_ip
            .map(|ip| ip.trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|ip| !ip.is_empty());

        Ok(Self {
            host_ip,
            host_ports,
            container_ports,
            protocol,
        })
    }

    /// Expand ranges into individual port pairs
    pub fn pairs(&self) -> Vec<PortPair> {
        let host_ports: Vec<Option<u16>> = match &self.host_ports {
            Some(range) => range.clone().map(Some).collect(),
            None => vec![None; self.container_ports.len()],
        };

        self.container_ports
            .clone()
            .zip(host_ports)
            .map(|(container_port, host_port)| PortPair {
                host_ip: self.host_ip.clone(),
                host_port,
                container_port,
                protocol: self.protocol.clone(),
            })
            .collect()
    }
}

impl fmt::Display for PortBinding {
    /// Renders the mapping in the client binaries' `-p` syntax
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = |r: &RangeInclusive<u16>| {
            if r.start() == r.end() {
                r.start().to_string()
            } else {
                format!("{}-{}", r.start(), r.end())
            }
        };
        if let Some(ip) = &self.host_ip {
            let ip = if ip.contains(':') { format!("[{}]", ip) } else { ip.clone() };
            write!(f, "{}:", ip)?;
        }
        match &self.host_ports {
            Some(host) => write!(f, "{}:", range(host))?,
            None if self.host_ip.is_some() => write!(f, ":")?,
            None => {}
        }
        write!(f, "{}/{}", range(&self.container_ports), self.protocol)
    }
}

fn parse_range(value: &str) -> Option<RangeInclusive<u16>> {
    let (start, end) = match value.split_once('-') {
        Some((start, end)) => (start.parse().ok()?, end.parse().ok()?),
        None => {
            let port = value.parse().ok()?;
            (port, port)
        }
    };
    (start <= end).then_some(start..=end)
}
