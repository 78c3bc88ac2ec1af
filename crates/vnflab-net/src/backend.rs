//! The substrate seam of the emulated network.
//!
//! [`EmulatedNetwork`](crate::EmulatedNetwork) decides *what* to create and
//! in which order; a [`NetworkBackend`] decides *how*.

use std::fmt;

use async_trait::async_trait;
use vnflab_common::{CommandOutput, NodeId, VnfResult};

use crate::controller::Controller;
use crate::shaping::LinkShaping;
use crate::topology::{Host, HostAddress, Link, NodeKind, Switch};

/// One side of a link as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEnd {
    /// Node on this side.
    pub node: NodeId,
    /// Whether the node is a host or a switch.
    pub kind: NodeKind,
    /// Per-node port number, counted in link insertion order from 0.
    pub port: usize,
    /// Address to assign to this interface. Only a host's first port is
    /// addressed.
    pub address: Option<HostAddress>,
}

impl LinkEnd {
    /// Interface name inside a host, e.g. `eth0`.
    #[must_use]
    pub fn host_interface(&self) -> String {
        format!("eth{}", self.port)
    }
}

/// A link resolved against its topology, ready to be realized.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkPlan {
    /// Link index in the topology.
    pub index: usize,
    /// First endpoint.
    pub a: LinkEnd,
    /// Second endpoint.
    pub b: LinkEnd,
    /// Shaping to apply to both ends.
    pub shaping: Option<LinkShaping>,
}

impl LinkPlan {
    /// Both ends, first endpoint first.
    #[must_use]
    pub fn ends(&self) -> [&LinkEnd; 2] {
        [&self.a, &self.b]
    }
}

/// An entity created while starting the network.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// The control plane.
    Controller(Controller),
    /// A switch.
    Switch(Switch),
    /// A host.
    Host(Host),
    /// A link, shaped or not.
    Link(LinkPlan),
}

impl Entity {
    /// The host, if this entity is one.
    #[must_use]
    pub fn as_host(&self) -> Option<&Host> {
        match self {
            Self::Host(host) => Some(host),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller(c) => write!(f, "controller {}", c.name),
            Self::Switch(s) => write!(f, "switch {}", s.id),
            Self::Host(h) => write!(f, "host {}", h.id),
            Self::Link(l) => write!(f, "link {} ({}-{})", l.index, l.a.node, l.b.node),
        }
    }
}

/// Packet-forwarding substrate.
///
/// Every `create_*` either fully creates its entity or fails having created
/// nothing that needs a matching `destroy_*`. Every `destroy_*` tolerates an
/// entity that is already gone.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    /// Bring up the control plane.
    async fn create_controller(&self, controller: &Controller) -> VnfResult<()>;

    /// Create a switch.
    async fn create_switch(&self, switch: &Switch) -> VnfResult<()>;

    /// Create a host and its isolated network stack.
    async fn create_host(&self, host: &Host) -> VnfResult<()>;

    /// Wire a link between two already created nodes.
    async fn create_link(&self, link: &LinkPlan) -> VnfResult<()>;

    /// Apply bandwidth and delay to both ends of a created link.
    async fn shape_link(&self, link: &LinkPlan, shaping: &LinkShaping) -> VnfResult<()>;

    /// Tear down a link.
    async fn destroy_link(&self, link: &LinkPlan) -> VnfResult<()>;

    /// Tear down a host.
    async fn destroy_host(&self, host: &Host) -> VnfResult<()>;

    /// Tear down a switch.
    async fn destroy_switch(&self, switch: &Switch) -> VnfResult<()>;

    /// Tear down the control plane.
    async fn destroy_controller(&self, controller: &Controller) -> VnfResult<()>;

    /// Run a shell command line on a live host.
    async fn exec(&self, host: &NodeId, command: &str) -> VnfResult<CommandOutput>;

    /// Name of the container whose network namespace workloads placed on
    /// `host` should join.
    fn attachment(&self, host: &NodeId) -> Option<String>;

    /// Destroy any entity, dispatching on its kind.
    async fn destroy(&self, entity: &Entity) -> VnfResult<()> {
        match entity {
            Entity::Controller(c) => self.destroy_controller(c).await,
            Entity::Switch(s) => self.destroy_switch(s).await,
            Entity::Host(h) => self.destroy_host(h).await,
            Entity::Link(l) => self.destroy_link(l).await,
        }
    }
}
