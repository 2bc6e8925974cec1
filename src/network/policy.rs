//! Outbound network policy
//!
//! [`NetworkPolicy`] is the single source of truth the gate consults for every
//! outbound request: which hosts, ports and protocols are allowed, and which
//! address ranges are never reachable. It is built once (usually from
//! [`crate::config::NetworkConfig`]) and is read-only afterwards.
//!
//! Blocked ranges are matched with a bitwise mask over the 32-bit integer form
//! of an IPv4 address. IPv6 ranges parse and are kept so configuration stays
//! honest, but they are not enforced; a warning is logged when such a range is
//! loaded.

use crate::config::NetworkConfig;
use crate::error::{McpGateError, Result};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::time::Duration;

/// Host names that bypass address resolution and range checks.
///
/// They still have to appear in the allow-list to be reachable.
pub const LOOPBACK_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// Ranges blocked when no explicit list is configured.
pub const DEFAULT_BLOCKED_CIDRS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "fc00::/7",
    "fe80::/10",
];

/// A parsed CIDR range.
///
/// # Examples
///
/// ```
/// use mcpgate::network::policy::CidrBlock;
/// use std::net::Ipv4Addr;
///
/// let block: CidrBlock = "172.16.0.0/12".parse().unwrap();
/// assert!(block.contains_v4(Ipv4Addr::new(172, 20, 1, 1)));
/// assert!(!block.contains_v4(Ipv4Addr::new(172, 32, 0, 1)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidrBlock {
    /// IPv4 range, enforced.
    V4 {
        /// Network address as a big-endian integer, already masked
        network: u32,
        /// Prefix length (0..=32)
        prefix: u8,
    },
    /// IPv6 range, recognised but not enforced.
    V6 {
        /// Network address
        network: Ipv6Addr,
        /// Prefix length (0..=128)
        prefix: u8,
    },
}

impl CidrBlock {
    fn v4_mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// Returns true when `addr` falls inside this range.
    ///
    /// Always false for IPv6 ranges.
    pub fn contains_v4(&self, addr: Ipv4Addr) -> bool {
        match *self {
            CidrBlock::V4 { network, prefix } => {
                let mask = Self::v4_mask(prefix);
                u32::from(addr) & mask == network
            }
            CidrBlock::V6 { .. } => false,
        }
    }

    /// Whether this range is an IPv6 range.
    pub fn is_v6(&self) -> bool {
        matches!(self, CidrBlock::V6 { .. })
    }
}

impl FromStr for CidrBlock {
    type Err = McpGateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| McpGateError::Config(format!("Invalid CIDR address: {}", s)))?;

        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| McpGateError::Config(format!("Invalid CIDR prefix: {}", s)))?,
            None => max,
        };

        Ok(match addr {
            IpAddr::V4(v4) => CidrBlock::V4 {
                network: u32::from(v4) & Self::v4_mask(prefix),
                prefix,
            },
            IpAddr::V6(network) => CidrBlock::V6 { network, prefix },
        })
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidrBlock::V4 { network, prefix } => {
                write!(f, "{}/{}", Ipv4Addr::from(*network), prefix)
            }
            CidrBlock::V6 { network, prefix } => write!(f, "{}/{}", network, prefix),
        }
    }
}

/// Process-wide outbound request policy.
///
/// # Examples
///
/// ```
/// use mcpgate::network::policy::NetworkPolicy;
///
/// let policy = NetworkPolicy::default()
///     .with_allowed_host("mcp.example.com")
///     .with_allowed_port(8443);
/// assert!(policy.is_host_allowed("mcp.example.com"));
/// assert!(!policy.is_host_allowed("sub.mcp.example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    allowed_hosts: HashSet<String>,
    allowed_ports: HashSet<u16>,
    allowed_protocols: HashSet<String>,
    blocked_cidrs: Vec<CidrBlock>,
    max_redirects: u32,
    timeout: Duration,
    stream_handshake_timeout: Duration,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowed_hosts: LOOPBACK_NAMES.iter().map(|h| h.to_string()).collect(),
            allowed_ports: [80, 443].into_iter().collect(),
            allowed_protocols: ["http", "https"].iter().map(|p| p.to_string()).collect(),
            blocked_cidrs: DEFAULT_BLOCKED_CIDRS
                .iter()
                .filter_map(|c| c.parse().ok())
                .collect(),
            max_redirects: 0,
            timeout: Duration::from_millis(15_000),
            stream_handshake_timeout: Duration::from_millis(1_000),
        }
    }
}

impl NetworkPolicy {
    /// Build a policy from the `network` configuration section
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Config` if a blocked range cannot be parsed.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let blocked_cidrs = config
            .blocked_cidrs
            .iter()
            .map(|c| c.parse::<CidrBlock>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let unenforced: Vec<String> = blocked_cidrs
            .iter()
            .filter(|c| c.is_v6())
            .map(|c| c.to_string())
            .collect();
        if !unenforced.is_empty() {
            tracing::warn!(
                "IPv6 blocked ranges are recognised but not enforced: {}",
                unenforced.join(", ")
            );
        }

        if config.max_redirects != 0 {
            tracing::warn!(
                "max_redirects={} ignored; redirects are never followed",
                config.max_redirects
            );
        }

        Ok(Self {
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
            allowed_ports: config.allowed_ports.iter().copied().collect(),
            allowed_protocols: config
                .allowed_protocols
                .iter()
                .map(|p| p.trim().trim_end_matches(':').to_ascii_lowercase())
                .collect(),
            blocked_cidrs,
            max_redirects: config.max_redirects,
            timeout: Duration::from_millis(config.timeout_ms),
            stream_handshake_timeout: Duration::from_millis(config.stream_handshake_timeout_ms),
        })
    }

    /// Add a host to the allow-list
    pub fn with_allowed_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Add a port to the allow-list
    pub fn with_allowed_port(mut self, port: u16) -> Self {
        self.allowed_ports.insert(port);
        self
    }

    /// Add a blocked range
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Config` if the range cannot be parsed.
    pub fn with_blocked_cidr(mut self, cidr: &str) -> Result<Self> {
        self.blocked_cidrs.push(cidr.parse()?);
        Ok(self)
    }

    /// Override the end-to-end request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the stream handshake timeout
    pub fn with_stream_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.stream_handshake_timeout = timeout;
        self
    }

    /// Exact, case-sensitive allow-list lookup; no wildcard or subdomain matching.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.contains(host)
    }

    /// Whether the effective port is allowed
    pub fn is_port_allowed(&self, port: u16) -> bool {
        self.allowed_ports.contains(&port)
    }

    /// Whether the URL scheme is allowed
    pub fn is_protocol_allowed(&self, scheme: &str) -> bool {
        self.allowed_protocols.contains(scheme)
    }

    /// Find the blocked range containing `addr`, if any.
    ///
    /// IPv4-mapped IPv6 addresses are checked as IPv4. Other IPv6 addresses
    /// are never matched.
    pub fn blocked_range_for(&self, addr: IpAddr) -> Option<&CidrBlock> {
        let v4 = match addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => {
                    tracing::debug!("IPv6 address {} not checked against blocked ranges", v6);
                    return None;
                }
            },
        };
        self.blocked_cidrs.iter().find(|c| c.contains_v4(v4))
    }

    /// Configured redirect budget (always treated as zero by the gate)
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    /// End-to-end timeout for non-streaming requests
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time allowed for a streaming request to receive response headers
    pub fn stream_handshake_timeout(&self) -> Duration {
        self.stream_handshake_timeout
    }
}
