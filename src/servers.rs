//! Upstream server table and per-query server selection.
//!
//! A server with an empty domain whitelist is global. A server with a
//! whitelist is the exclusive route for names under any of its entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{PoisonError, RwLock};

use crate::domain;
use crate::error::ConfigError;
use crate::notice::Notice;

pub const DEFAULT_PORT: u16 = 53;

/// An upstream DNS server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub local_resolver: bool,
    #[serde(default, rename = "adblocker")]
    pub ad_blocker: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_whitelist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_active() -> bool {
    true
}

impl UpstreamServer {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            port: DEFAULT_PORT,
            active: true,
            local_resolver: false,
            ad_blocker: false,
            domain_whitelist: Vec::new(),
            last_used: None,
            last_success: None,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn is_global(&self) -> bool {
        self.domain_whitelist.is_empty()
    }

    /// Apply `key:value` parameters, validating all of them first.
    fn apply<S: AsRef<str>>(&mut self, params: &[S]) -> Result<(), ConfigError> {
        let mut updated = self.clone();
        for param in params {
            updated.apply_one(param.as_ref())?;
        }
        *self = updated;
        Ok(())
    }

    fn apply_one(&mut self, param: &str) -> Result<(), ConfigError> {
        let (key, value) = param
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedParameter(param.to_string()))?;
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "port" => {
                self.port = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(value.to_string()))?;
            }
            "active" => self.active = parse_bool("active", value)?,
            "localresolver" => self.local_resolver = parse_bool("localresolver", value)?,
            "adblocker" => self.ad_blocker = parse_bool("adblocker", value)?,
            "whitelist" => {
                self.domain_whitelist = value
                    .split(',')
                    .map(domain::normalize)
                    .filter(|entry| !entry.is_empty())
                    .collect();
            }
            _ => return Err(ConfigError::UnknownParameter(key.to_string())),
        }

        Ok(())
    }
}

impl fmt::Display for UpstreamServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())?;
        if !self.active {
            f.write_str(" [inactive]")?;
        }
        if self.local_resolver {
            f.write_str(" [local]")?;
        }
        if self.ad_blocker {
            f.write_str(" [adblocker]")?;
        }
        if self.is_global() {
            f.write_str(" global")
        } else {
            write!(f, " whitelist={}", self.domain_whitelist.join(","))
        }
    }
}

fn parse_bool(param: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            param: param.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_address(address: &str) -> Result<IpAddr, ConfigError> {
    address
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(address.to_string()))
}

/// Returns true if `server` has a whitelist covering `name`.
pub fn server_matches_query(server: &UpstreamServer, name: &str) -> bool {
    !server.domain_whitelist.is_empty() && domain::matches(name, &server.domain_whitelist)
}

/// Outcome of upstream selection for one query name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Whitelist servers claiming the name. Never merged with global servers.
    Exclusive(Vec<SocketAddr>),
    /// The name is claimed by a whitelist but none of its servers qualify.
    Denied,
    /// Servers without a whitelist.
    Global(Vec<SocketAddr>),
}

impl Selection {
    pub fn addresses(&self) -> &[SocketAddr] {
        match self {
            Selection::Exclusive(addrs) | Selection::Global(addrs) => addrs,
            Selection::Denied => &[],
        }
    }
}

/// Pick the upstream set for `name`.
pub fn servers_for_query(servers: &[UpstreamServer], name: &str, active_only: bool) -> Selection {
    let name = domain::normalize(name);
    let eligible = |server: &UpstreamServer| !active_only || server.active;

    let mut claimed = false;
    let mut exclusive = Vec::new();
    for server in servers.iter().filter(|s| server_matches_query(s, &name)) {
        claimed = true;
        if eligible(server) {
            exclusive.push(server.socket_addr());
        }
    }

    if !exclusive.is_empty() {
        return Selection::Exclusive(exclusive);
    }
    if claimed {
        return Selection::Denied;
    }

    Selection::Global(
        servers
            .iter()
            .filter(|s| s.is_global() && eligible(*s))
            .map(UpstreamServer::socket_addr)
            .collect(),
    )
}

/// Concurrent table of upstream servers.
pub struct ServerRegistry {
    servers: RwLock<Vec<UpstreamServer>>,
}

impl ServerRegistry {
    pub fn new(servers: Vec<UpstreamServer>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Add a server. An existing address is reported, not replaced.
    pub fn add<S: AsRef<str>>(
        &self,
        address: &str,
        params: &[S],
    ) -> Result<Vec<Notice>, ConfigError> {
        let ip = parse_address(address)?;
        let mut server = UpstreamServer::new(ip);
        server.apply(params)?;

        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        if servers.iter().any(|s| s.address == ip) {
            return Ok(vec![Notice::warning(format!("server {} already exists", ip))]);
        }

        let notice = Notice::info(format!("added server {}", server));
        servers.push(server);
        Ok(vec![notice])
    }

    /// Update an existing server in place.
    pub fn update<S: AsRef<str>>(
        &self,
        address: &str,
        params: &[S],
    ) -> Result<Vec<Notice>, ConfigError> {
        let ip = parse_address(address)?;

        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(server) = servers.iter_mut().find(|s| s.address == ip) else {
            return Ok(vec![Notice::warning(format!("no server with address {}", ip))]);
        };

        server.apply(params)?;
        Ok(vec![Notice::info(format!("updated server {}", server))])
    }

    pub fn remove(&self, address: &str) -> Result<Vec<Notice>, ConfigError> {
        let ip = parse_address(address)?;

        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = servers.iter().position(|s| s.address == ip) else {
            return Ok(vec![Notice::warning(format!("no server with address {}", ip))]);
        };

        let removed = servers.remove(pos);
        Ok(vec![Notice::info(format!("removed server {}", removed))])
    }

    pub fn list(&self) -> Vec<UpstreamServer> {
        self.servers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.servers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select upstreams for `name` against the current table.
    pub fn select(&self, name: &str, active_only: bool) -> Selection {
        let servers = self.servers.read().unwrap_or_else(PoisonError::into_inner);
        servers_for_query(&servers, name, active_only)
    }

    /// Stamp `last_used` on every server a query was dispatched to.
    pub fn mark_used(&self, addrs: &[SocketAddr], at: DateTime<Utc>) {
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        for server in servers.iter_mut() {
            if addrs.contains(&server.socket_addr()) {
                server.last_used = Some(at);
            }
        }
    }

    /// Stamp `last_success` on the server whose answer was used.
    pub fn mark_success(&self, addr: SocketAddr, at: DateTime<Utc>) {
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(server) = servers.iter_mut().find(|s| s.socket_addr() == addr) {
            server.last_success = Some(at);
        }
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
