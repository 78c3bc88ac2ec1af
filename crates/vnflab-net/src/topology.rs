//! Topology graph: hosts, switches and shaped links.
//!
//! The graph is a plain data model. Nothing here touches the kernel; a
//! [`Topology`] is only realized when handed to
//! [`EmulatedNetwork::start`](crate::EmulatedNetwork::start).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vnflab_common::{NodeId, VnfError, VnfResult};

use crate::shaping::LinkShaping;

/// Prefix length used when none is given (the private 10.0.0.0/8 block).
pub const DEFAULT_PREFIX_LEN: u8 = 8;

/// Role a host plays in the streaming scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    /// Hosts the streaming server VNF.
    Server,
    /// Hosts the streaming client VNF.
    Client,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// IPv4 address with prefix length, e.g. `10.0.0.1/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostAddress {
    /// The address.
    pub ip: Ipv4Addr,
    /// Prefix length (0-32).
    pub prefix_len: u8,
}

impl HostAddress {
    /// Address with the default /8 prefix.
    #[must_use]
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            prefix_len: DEFAULT_PREFIX_LEN,
        }
    }
}

impl From<Ipv4Addr> for HostAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self::new(ip)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

impl FromStr for HostAddress {
    type Err = VnfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VnfError::Config {
            message: format!("Invalid host address '{s}'"),
        };
        let (ip, prefix_len) = match s.split_once('/') {
            Some((ip, len)) => (ip, len.parse::<u8>().map_err(|_| invalid())?),
            None => (s, DEFAULT_PREFIX_LEN),
        };
        if prefix_len > 32 {
            return Err(invalid());
        }
        let ip = ip.parse().map_err(|_| invalid())?;
        Ok(Self { ip, prefix_len })
    }
}

/// Kind of node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Addressable endpoint.
    Host,
    /// Forwarding node.
    Switch,
}

/// An addressable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Host name.
    pub id: NodeId,
    /// Network address.
    pub address: HostAddress,
    /// Role tag.
    pub role: Option<HostRole>,
    /// Names of containers placed on this host. Lookup only; the container
    /// manager owns their lifetime.
    pub containers: BTreeSet<String>,
}

/// A forwarding node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    /// Switch name.
    pub id: NodeId,
}

/// A connection between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Position in insertion order; stable for the lifetime of the topology.
    pub index: usize,
    /// First endpoint.
    pub a: NodeId,
    /// Second endpoint.
    pub b: NodeId,
    /// Emulated bandwidth/delay, if any.
    pub shaping: Option<LinkShaping>,
}

impl Link {
    /// Whether this link carries any shaping.
    #[must_use]
    pub fn is_shaped(&self) -> bool {
        self.shaping.is_some_and(|s| !s.is_unshaped())
    }

    /// The endpoint opposite `node`, if `node` is on this link.
    #[must_use]
    pub fn peer_of(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.a == node {
            Some(&self.b)
        } else if &self.b == node {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Handle to a host returned by [`Topology::add_host`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostRef(pub NodeId);

/// Handle to a switch returned by [`Topology::add_switch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwitchRef(pub NodeId);

/// Handle to a link returned by [`Topology::add_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkRef(pub usize);

/// Hosts, switches and links.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    hosts: Vec<Host>,
    switches: Vec<Switch>,
    links: Vec<Link>,
    kinds: HashMap<NodeId, NodeKind>,
}

impl Topology {
    /// Create an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The two-host streaming topology.
    ///
    /// `server`@10.0.0.1 and `client`@10.0.0.2 hang off switches `s1` and
    /// `s2`; only the `s1`–`s2` link is shaped.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::InvalidShaping`] for negative shaping values.
    pub fn streaming_default(bandwidth_mbit: f64, delay_ms: f64) -> VnfResult<Self> {
        let mut topo = Self::new();
        topo.add_host_with_role("server", Ipv4Addr::new(10, 0, 0, 1), HostRole::Server)?;
        topo.add_host_with_role("client", Ipv4Addr::new(10, 0, 0, 2), HostRole::Client)?;
        topo.add_switch("s1")?;
        topo.add_switch("s2")?;
        topo.add_link("s1", "server", None)?;
        topo.add_link("s1", "s2", Some(LinkShaping::new(bandwidth_mbit, delay_ms)?))?;
        topo.add_link("s2", "client", None)?;
        Ok(topo)
    }

    /// Add a host.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::DuplicateIdentity`] if the id is already taken and
    /// [`VnfError::InvalidNodeId`] if it is malformed.
    pub fn add_host(&mut self, id: &str, address: impl Into<HostAddress>) -> VnfResult<HostRef> {
        self.insert_host(id, address.into(), None)
    }

    /// Add a host tagged with a role.
    ///
    /// # Errors
    ///
    /// Same as [`Topology::add_host`].
    pub fn add_host_with_role(
        &mut self,
        id: &str,
        address: impl Into<HostAddress>,
        role: HostRole,
    ) -> VnfResult<HostRef> {
        self.insert_host(id, address.into(), Some(role))
    }

    fn insert_host(
        &mut self,
        id: &str,
        address: HostAddress,
        role: Option<HostRole>,
    ) -> VnfResult<HostRef> {
        let id = self.claim(id, NodeKind::Host)?;
        tracing::debug!(host = %id, %address, "Adding host");
        self.hosts.push(Host {
            id: id.clone(),
            address,
            role,
            containers: BTreeSet::new(),
        });
        Ok(HostRef(id))
    }

    /// Add a switch.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::DuplicateIdentity`] if the id is already taken.
    pub fn add_switch(&mut self, id: &str) -> VnfResult<SwitchRef> {
        let id = self.claim(id, NodeKind::Switch)?;
        tracing::debug!(switch = %id, "Adding switch");
        self.switches.push(Switch { id: id.clone() });
        Ok(SwitchRef(id))
    }

    /// Add a link between two existing nodes.
    ///
    /// # Errors
    ///
    /// - [`VnfError::UnknownEndpoint`] if either endpoint is missing
    /// - [`VnfError::InvalidShaping`] for negative bandwidth or delay
    /// - [`VnfError::HostToHostLink`] if both endpoints are hosts
    /// - [`VnfError::SelfLink`] if both endpoints are the same node
    pub fn add_link(
        &mut self,
        a: &str,
        b: &str,
        shaping: Option<LinkShaping>,
    ) -> VnfResult<LinkRef> {
        let (a_id, a_kind) = self.resolve(a)?;
        let (b_id, b_kind) = self.resolve(b)?;

        if a_id == b_id {
            return Err(VnfError::SelfLink { id: a_id.to_string() });
        }
        if a_kind == NodeKind::Host && b_kind == NodeKind::Host {
            return Err(VnfError::HostToHostLink {
                a: a_id.to_string(),
                b: b_id.to_string(),
            });
        }
        if let Some(shaping) = &shaping {
            shaping.validate()?;
        }

        let index = self.links.len();
        tracing::debug!(a = %a_id, b = %b_id, ?shaping, "Adding link");
        self.links.push(Link {
            index,
            a: a_id,
            b: b_id,
            shaping,
        });
        Ok(LinkRef(index))
    }

    fn claim(&mut self, id: &str, kind: NodeKind) -> VnfResult<NodeId> {
        let id = NodeId::new(id)?;
        if self.kinds.contains_key(&id) {
            return Err(VnfError::DuplicateIdentity { id: id.to_string() });
        }
        self.kinds.insert(id.clone(), kind);
        Ok(id)
    }

    fn resolve(&self, id: &str) -> VnfResult<(NodeId, NodeKind)> {
        let unknown = || VnfError::UnknownEndpoint { id: id.to_string() };
        let node = NodeId::new(id).map_err(|_| unknown())?;
        let kind = *self.kinds.get(&node).ok_or_else(unknown)?;
        Ok((node, kind))
    }

    /// Check the graph can be started: at least one host, and every host
    /// reachable from every other host through switches.
    ///
    /// Hosts do not forward, so a path may only pass through switches.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::TopologyInvalid`] describing the problem.
    pub fn validate(&self) -> VnfResult<()> {
        let Some(first) = self.hosts.first() else {
            return Err(VnfError::TopologyInvalid {
                message: "topology has no hosts".to_string(),
            });
        };

        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for link in &self.links {
            adjacency.entry(&link.a).or_default().push(&link.b);
            adjacency.entry(&link.b).or_default().push(&link.a);
        }

        let mut seen: HashSet<&NodeId> = HashSet::from([&first.id]);
        let mut queue = VecDeque::from([&first.id]);
        while let Some(node) = queue.pop_front() {
            if node != &first.id && self.kind_of(node) == Some(NodeKind::Host) {
                continue;
            }
            for &next in adjacency.get(node).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let unreachable: Vec<&str> = self
            .hosts
            .iter()
            .filter(|h| !seen.contains(&h.id))
            .map(|h| h.id.as_str())
            .collect();
        if !unreachable.is_empty() {
            return Err(VnfError::TopologyInvalid {
                message: format!(
                    "hosts not reachable from {}: {}",
                    first.id,
                    unreachable.join(", ")
                ),
            });
        }

        Ok(())
    }

    /// Kind of the named node, if present.
    #[must_use]
    pub fn kind_of(&self, id: &NodeId) -> Option<NodeKind> {
        self.kinds.get(id).copied()
    }

    /// Look up a host by name.
    #[must_use]
    pub fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id.as_str() == id)
    }

    /// Look up a host by address.
    #[must_use]
    pub fn host_by_address(&self, ip: Ipv4Addr) -> Option<&Host> {
        self.hosts.iter().find(|h| h.address.ip == ip)
    }

    /// First host carrying `role`.
    #[must_use]
    pub fn host_with_role(&self, role: HostRole) -> Option<&Host> {
        self.hosts.iter().find(|h| h.role == Some(role))
    }

    /// All hosts in insertion order.
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// All switches in insertion order.
    #[must_use]
    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    /// All links in insertion order.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links touching `node`.
    pub fn links_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| &l.a == node || &l.b == node)
    }

    /// Links carrying shaping.
    pub fn shaped_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.is_shaped())
    }

    /// Record that `container` was placed on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::HostNotFound`] if the host does not exist.
    pub fn bind_container(&mut self, host: &str, container: &str) -> VnfResult<()> {
        let host = self
            .hosts
            .iter_mut()
            .find(|h| h.id.as_str() == host)
            .ok_or_else(|| VnfError::HostNotFound {
                host: host.to_string(),
            })?;
        host.containers.insert(container.to_string());
        Ok(())
    }

    /// Forget a container placement. Unknown hosts and containers are ignored.
    pub fn unbind_container(&mut self, host: &str, container: &str) {
        if let Some(host) = self.hosts.iter_mut().find(|h| h.id.as_str() == host) {
            host.containers.remove(container);
        }
    }

    /// Total node count.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.hosts.len() + self.switches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn streaming_default_shape() {
        let topo = Topology::streaming_default(10.0, 5.0).unwrap();
        assert_eq!(topo.hosts().len(), 2);
        assert_eq!(topo.switches().len(), 2);
        assert_eq!(topo.links().len(), 3);

        let shaped: Vec<_> = topo.shaped_links().collect();
        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0].a.as_str(), "s1");
        assert_eq!(shaped[0].b.as_str(), "s2");

        let server = topo.host_with_role(HostRole::Server).unwrap();
        assert_eq!(server.address.to_string(), "10.0.0.1/8");
        topo.validate().unwrap();
    }

    #[test]
    fn duplicate_identity_across_kinds() {
        let mut topo = Topology::new();
        topo.add_host("h1", ip(1)).unwrap();
        assert!(matches!(
            topo.add_switch("h1"),
            Err(VnfError::DuplicateIdentity { .. })
        ));
        assert!(matches!(
            topo.add_host("h1", ip(2)),
            Err(VnfError::DuplicateIdentity { .. })
        ));
    }

    #[test]
    fn link_requires_existing_endpoints() {
        let mut topo = Topology::new();
        topo.add_switch("s1").unwrap();
        let err = topo.add_link("s1", "ghost", None).unwrap_err();
        assert!(matches!(err, VnfError::UnknownEndpoint { id } if id == "ghost"));
        assert!(topo.links().is_empty());
    }

    #[test]
    fn host_to_host_link_rejected() {
        let mut topo = Topology::new();
        topo.add_host("h1", ip(1)).unwrap();
        topo.add_host("h2", ip(2)).unwrap();
        assert!(matches!(
            topo.add_link("h1", "h2", None),
            Err(VnfError::HostToHostLink { .. })
        ));
    }

    #[test]
    fn self_link_rejected() {
        let mut topo = Topology::new();
        topo.add_switch("s1").unwrap();
        assert!(matches!(
            topo.add_link("s1", "s1", None),
            Err(VnfError::SelfLink { .. })
        ));
    }

    #[test]
    fn negative_shaping_rejected_on_link() {
        let mut topo = Topology::new();
        topo.add_switch("s1").unwrap();
        topo.add_switch("s2").unwrap();
        let shaping = LinkShaping {
            bandwidth_mbit: Some(-1.0),
            delay_ms: None,
        };
        assert!(matches!(
            topo.add_link("s1", "s2", Some(shaping)),
            Err(VnfError::InvalidShaping { .. })
        ));
    }

    #[test]
    fn disconnected_topology_fails_validation() {
        let mut topo = Topology::new();
        topo.add_host("h1", ip(1)).unwrap();
        topo.add_host("h2", ip(2)).unwrap();
        topo.add_switch("s1").unwrap();
        topo.add_switch("s2").unwrap();
        topo.add_link("s1", "h1", None).unwrap();
        topo.add_link("s2", "h2", None).unwrap();

        let err = topo.validate().unwrap_err();
        assert!(err.to_string().contains("h2"));
    }

    #[test]
    fn hosts_do_not_forward() {
        // h1 - s1 - h2 - s2 - h3: h3 is only reachable through h2.
        let mut topo = Topology::new();
        topo.add_host("h1", ip(1)).unwrap();
        topo.add_host("h2", ip(2)).unwrap();
        topo.add_host("h3", ip(3)).unwrap();
        topo.add_switch("s1").unwrap();
        topo.add_switch("s2").unwrap();
        topo.add_link("h1", "s1", None).unwrap();
        topo.add_link("s1", "h2", None).unwrap();
        topo.add_link("h2", "s2", None).unwrap();
        topo.add_link("s2", "h3", None).unwrap();

        let err = topo.validate().unwrap_err();
        assert!(err.to_string().contains("h3"));
    }

    #[test]
    fn empty_topology_is_invalid() {
        assert!(matches!(
            Topology::new().validate(),
            Err(VnfError::TopologyInvalid { .. })
        ));
    }

    #[test]
    fn container_back_references() {
        let mut topo = Topology::streaming_default(10.0, 5.0).unwrap();
        topo.bind_container("server", "streaming_server").unwrap();
        assert!(topo.host("server").unwrap().containers.contains("streaming_server"));

        topo.unbind_container("server", "streaming_server");
        assert!(topo.host("server").unwrap().containers.is_empty());

        assert!(matches!(
            topo.bind_container("nope", "x"),
            Err(VnfError::HostNotFound { .. })
        ));
    }

    #[test]
    fn host_address_parsing() {
        let addr: HostAddress = "10.0.0.7/24".parse().unwrap();
        assert_eq!(addr.ip, ip(7));
        assert_eq!(addr.prefix_len, 24);

        let bare: HostAddress = "10.0.0.8".parse().unwrap();
        assert_eq!(bare.prefix_len, DEFAULT_PREFIX_LEN);

        assert!("10.0.0.1/33".parse::<HostAddress>().is_err());
        assert!("not-an-ip".parse::<HostAddress>().is_err());
    }
}
