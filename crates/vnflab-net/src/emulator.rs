//! The emulated network: realizes a [`Topology`] on a [`NetworkBackend`].
//!
//! Every entity created during [`EmulatedNetwork::start`] is appended to an
//! ordered ledger. A failed start destroys exactly the ledger's contents in
//! reverse order; [`EmulatedNetwork::stop`] does the same for a running
//! network. Creation order is controller, switches, hosts, links, so both
//! paths tear down links, then hosts, then switches, then the controller.

use std::collections::HashMap;
use std::time::Duration;

use vnflab_common::{CommandOutput, NodeId, VnfError, VnfResult};

use crate::backend::{Entity, LinkEnd, LinkPlan, NetworkBackend};
use crate::controller::Controller;
use crate::topology::{NodeKind, Topology};

/// Lifecycle state of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Not started yet.
    Idle,
    /// Started and usable.
    Running,
    /// Stopped, or rolled back after a failed start.
    Stopped,
}

/// A topology realized on a backend.
pub struct EmulatedNetwork<B> {
    backend: B,
    controller: Option<Controller>,
    topology: Topology,
    ledger: Vec<Entity>,
    in_flight: Option<Entity>,
    state: NetworkState,
    start_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
}

impl<B: NetworkBackend> EmulatedNetwork<B> {
    /// Create an idle network on `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            controller: None,
            topology: Topology::new(),
            ledger: Vec::new(),
            in_flight: None,
            state: NetworkState::Idle,
            start_timeout: None,
            command_timeout: None,
        }
    }

    /// Bound the whole of [`start`](Self::start).
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Bound every [`run_command`](Self::run_command).
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Register the control plane. Must happen before [`start`](Self::start).
    pub fn add_controller(&mut self, controller: Controller) {
        tracing::debug!(controller = %controller, "Registering controller");
        self.controller = Some(controller);
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The topology being emulated. Empty until started.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable topology, for container placement bookkeeping.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NetworkState {
        self.state
    }

    /// Whether the network is started.
    pub fn is_running(&self) -> bool {
        self.state == NetworkState::Running
    }

    /// Number of live entities.
    pub fn live_entities(&self) -> usize {
        self.ledger.len()
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> &[Entity] {
        &self.ledger
    }

    fn live_host(&self, host: &str) -> VnfResult<NodeId> {
        let not_found = || VnfError::HostNotFound {
            host: host.to_string(),
        };
        if !self.is_running() {
            return Err(not_found());
        }
        self.ledger
            .iter()
            .filter_map(Entity::as_host)
            .find(|h| h.id.as_str() == host)
            .map(|h| h.id.clone())
            .ok_or_else(not_found)
    }

    /// Name of the container whose network namespace workloads on `host`
    /// join.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::HostNotFound`] if the host is not live.
    pub fn attachment(&self, host: &str) -> VnfResult<String> {
        let id = self.live_host(host)?;
        self.backend
            .attachment(&id)
            .ok_or_else(|| VnfError::HostNotFound {
                host: host.to_string(),
            })
    }

    /// Validate and realize `topology`.
    ///
    /// # Errors
    ///
    /// - [`VnfError::TopologyInvalid`] if the topology fails validation;
    ///   nothing is created
    /// - [`VnfError::NetworkStartFailed`] if no controller is registered,
    ///   the network is already running, any creation fails or the start
    ///   timeout expires; every entity created so far has been destroyed
    pub async fn start(&mut self, topology: Topology) -> VnfResult<()> {
        if self.state == NetworkState::Running {
            return Err(VnfError::NetworkStartFailed {
                message: "network is already running".to_string(),
            });
        }
        let Some(controller) = self.controller.clone() else {
            return Err(VnfError::NetworkStartFailed {
                message: "no controller registered".to_string(),
            });
        };
        topology.validate()?;

        tracing::info!(
            hosts = topology.hosts().len(),
            switches = topology.switches().len(),
            links = topology.links().len(),
            "Starting network"
        );

        let result = match self.start_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.realize(&controller, &topology)).await {
                    Ok(result) => result,
                    Err(_) => Err(VnfError::Timeout {
                        operation: "network start".to_string(),
                        limit,
                    }),
                }
            }
            None => self.realize(&controller, &topology).await,
        };

        match result {
            Ok(()) => {
                self.topology = topology;
                self.state = NetworkState::Running;
                tracing::info!(entities = self.ledger.len(), "Network started");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, created = self.ledger.len(), "Network start failed, rolling back");
                if let Some(partial) = self.in_flight.take() {
                    // Cancelled mid-creation; may have left something behind.
                    if let Err(e) = self.backend.destroy(&partial).await {
                        tracing::debug!(entity = %partial, error = %e, "Partial entity cleanup failed");
                    }
                }
                self.teardown().await;
                self.state = NetworkState::Stopped;
                Err(VnfError::NetworkStartFailed {
                    message: err.to_string(),
                })
            }
        }
    }

    async fn realize(&mut self, controller: &Controller, topology: &Topology) -> VnfResult<()> {
        self.create(Entity::Controller(controller.clone())).await?;
        for switch in topology.switches() {
            self.create(Entity::Switch(switch.clone())).await?;
        }
        for host in topology.hosts() {
            self.create(Entity::Host(host.clone())).await?;
        }
        for plan in plan_links(topology) {
            self.create(Entity::Link(plan)).await?;
        }
        Ok(())
    }

    async fn create(&mut self, entity: Entity) -> VnfResult<()> {
        tracing::debug!(entity = %entity, "Creating");
        self.in_flight = Some(entity.clone());

        let created = match &entity {
            Entity::Controller(c) => self.backend.create_controller(c).await,
            Entity::Switch(s) => self.backend.create_switch(s).await,
            Entity::Host(h) => self.backend.create_host(h).await,
            Entity::Link(plan) => self.backend.create_link(plan).await,
        };
        self.in_flight = None;
        created?;
        self.ledger.push(entity);

        if let Some(Entity::Link(plan)) = self.ledger.last() {
            if let Some(shaping) = plan.shaping.filter(|s| !s.is_unshaped()) {
                tracing::debug!(link = plan.index, %shaping, "Shaping link");
                self.backend.shape_link(plan, &shaping).await?;
            }
        }
        Ok(())
    }

    /// Run a shell command line on a live host.
    ///
    /// # Errors
    ///
    /// - [`VnfError::HostNotFound`] if the host is not live
    /// - [`VnfError::Timeout`] if the command timeout expires
    pub async fn run_command(&self, host: &str, command: &str) -> VnfResult<CommandOutput> {
        let id = self.live_host(host)?;
        tracing::debug!(host = %id, command, "Running command");

        match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.exec(&id, command))
                .await
                .map_err(|_| VnfError::Timeout {
                    operation: format!("{host}: {command}"),
                    limit,
                })?,
            None => self.backend.exec(&id, command).await,
        }
    }

    /// Tear the network down. Calling this on a network that is not running
    /// is a logged no-op.
    pub async fn stop(&mut self) {
        if self.state != NetworkState::Running {
            tracing::info!(state = ?self.state, "Network already stopped");
            return;
        }
        tracing::info!(entities = self.ledger.len(), "Stopping network");
        self.teardown().await;
        self.state = NetworkState::Stopped;
        tracing::info!("Network stopped");
    }

    async fn teardown(&mut self) {
        while let Some(entity) = self.ledger.pop() {
            tracing::debug!(entity = %entity, "Destroying");
            if let Err(e) = self.backend.destroy(&entity).await {
                tracing::warn!(entity = %entity, error = %e, "Teardown step failed, continuing");
            }
        }
    }
}

/// Resolve every link of `topology` into a [`LinkPlan`], numbering ports
/// per node in link order.
pub fn plan_links(topology: &Topology) -> Vec<LinkPlan> {
    let mut next_port: HashMap<NodeId, usize> = HashMap::new();
    let mut end = |node: &NodeId| -> LinkEnd {
        let port = next_port.entry(node.clone()).or_insert(0);
        let this = *port;
        *port += 1;
        let kind = topology.kind_of(node).unwrap_or(NodeKind::Switch);
        let address = match kind {
            NodeKind::Host if this == 0 => topology.host(node.as_str()).map(|h| h.address),
            _ => None,
        };
        LinkEnd {
            node: node.clone(),
            kind,
            port: this,
            address,
        }
    };

    topology
        .links()
        .iter()
        .map(|link| LinkPlan {
            index: link.index,
            a: end(&link.a),
            b: end(&link.b),
            shaping: link.shaping,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_numbered_per_node() {
        let topo = Topology::streaming_default(10.0, 5.0).unwrap();
        let plans = plan_links(&topo);
        assert_eq!(plans.len(), 3);

        // s1-server, s1-s2, s2-client
        assert_eq!((plans[0].a.port, plans[0].b.port), (0, 0));
        assert_eq!((plans[1].a.port, plans[1].b.port), (1, 0));
        assert_eq!((plans[2].a.port, plans[2].b.port), (1, 0));
        assert_eq!(plans[0].b.host_interface(), "eth0");
    }

    #[test]
    fn only_host_ends_are_addressed() {
        let topo = Topology::streaming_default(10.0, 5.0).unwrap();
        let plans = plan_links(&topo);
        assert!(plans[0].a.address.is_none());
        assert_eq!(plans[0].b.address.unwrap().to_string(), "10.0.0.1/8");
        assert_eq!(plans[2].b.address.unwrap().to_string(), "10.0.0.2/8");
        assert!(plans[1].shaping.is_some());
    }
}
