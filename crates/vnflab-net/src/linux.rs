//! Kernel-backed substrate: Linux bridges, veth pairs, `tc` and docker.
//!
//! Each switch is a bridge in the root namespace. Each host is a long-lived
//! docker container started without networking; its network namespace is
//! reached through the container's PID. Links are veth pairs whose ends are
//! enslaved to bridges or moved into host namespaces and renamed `eth<n>`.
//!
//! Every kernel name carries the run prefix so that concurrent runs on one
//! machine never collide.

use async_trait::async_trait;
use dashmap::DashMap;
use vnflab_common::command::{discard_container, run, run_checked};
use vnflab_common::{CommandOutput, NodeId, RunPrefix, VnfError, VnfResult};

use crate::backend::{LinkEnd, LinkPlan, NetworkBackend};
use crate::bridge::Bridge;
use crate::controller::Controller;
use crate::netns::HostNamespace;
use crate::shaping::LinkShaping;
use crate::topology::{Host, NodeKind, Switch};
use crate::veth::VethPair;

/// Image used for host containers when none is configured.
pub const DEFAULT_HOST_IMAGE: &str = "dev_test";

/// Linux substrate.
pub struct LinuxBackend {
    prefix: RunPrefix,
    host_image: String,
    pids: DashMap<NodeId, u32>,
}

impl LinuxBackend {
    /// Backend with a fresh run prefix and the default host image.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(RunPrefix::generate())
    }

    /// Backend with an explicit run prefix.
    #[must_use]
    pub fn with_prefix(prefix: RunPrefix) -> Self {
        Self {
            prefix,
            host_image: DEFAULT_HOST_IMAGE.to_string(),
            pids: DashMap::new(),
        }
    }

    /// Use another image for host containers.
    #[must_use]
    pub fn with_host_image(mut self, image: impl Into<String>) -> Self {
        self.host_image = image.into();
        self
    }

    /// The run prefix.
    pub fn prefix(&self) -> &RunPrefix {
        &self.prefix
    }

    /// Bridge name for a switch.
    pub fn bridge_name(&self, switch: &NodeId) -> String {
        self.prefix.scoped(switch.as_str())
    }

    /// Docker container name for a host.
    pub fn host_container(&self, host: &NodeId) -> String {
        format!("{}.{}", self.prefix, host)
    }

    /// Root-namespace names of a link's veth ends.
    pub fn veth_names(&self, link: &LinkPlan) -> (String, String) {
        let base = self.prefix.scoped(&format!("l{}", link.index));
        (format!("{base}a"), format!("{base}b"))
    }

    fn namespace(&self, host: &NodeId) -> VnfResult<HostNamespace> {
        self.pids
            .get(host)
            .map(|pid| HostNamespace::of_pid(*pid))
            .ok_or_else(|| VnfError::HostNotFound {
                host: host.to_string(),
            })
    }

    async fn attach_end(&self, end: &LinkEnd, veth: &str) -> VnfResult<()> {
        match end.kind {
            NodeKind::Switch => {
                Bridge::named(&self.bridge_name(&end.node))
                    .add_interface(veth)
                    .await
            }
            NodeKind::Host => {
                let ns = self.namespace(&end.node)?;
                VethPair::move_to_netns(veth, ns.pid).await?;
                let name = end.host_interface();
                match end.address {
                    Some(address) => ns.configure_interface(veth, &name, &address).await,
                    None => {
                        ns.exec_checked(&["ip", "link", "set", veth, "name", &name])
                            .await?;
                        ns.exec_checked(&["ip", "link", "set", &name, "up"]).await?;
                        Ok(())
                    }
                }
            }
        }
    }

    async fn shape_end(&self, end: &LinkEnd, veth: &str, shaping: &LinkShaping) -> VnfResult<()> {
        match end.kind {
            NodeKind::Switch => {
                for args in shaping.tc_commands(veth) {
                    let args: Vec<&str> = args.iter().map(String::as_str).collect();
                    run_checked("tc", &args).await?;
                }
            }
            NodeKind::Host => {
                let ns = self.namespace(&end.node)?;
                for args in shaping.tc_commands(&end.host_interface()) {
                    let full: Vec<&str> = std::iter::once("tc")
                        .chain(args.iter().map(String::as_str))
                        .collect();
                    ns.exec_checked(&full).await?;
                }
            }
        }
        Ok(())
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkBackend for LinuxBackend {
    async fn create_controller(&self, controller: &Controller) -> VnfResult<()> {
        // Bridges learn on their own; nothing to run.
        tracing::info!(controller = %controller, "Controller ready");
        Ok(())
    }

    async fn create_switch(&self, switch: &Switch) -> VnfResult<()> {
        Bridge::create(&self.bridge_name(&switch.id)).await?;
        tracing::info!(switch = %switch.id, "Switch created");
        Ok(())
    }

    async fn create_host(&self, host: &Host) -> VnfResult<()> {
        let name = self.host_container(&host.id);
        tracing::debug!(host = %host.id, container = %name, image = %self.host_image, "Starting host container");

        discard_container(&name).await;

        // A failed `docker run` can still leave a created container.
        let created = async {
            run_checked(
                "docker",
                &[
                    "run",
                    "-d",
                    "--name",
                    &name,
                    "--hostname",
                    host.id.as_str(),
                    "--network",
                    "none",
                    &self.host_image,
                    "sleep",
                    "infinity",
                ],
            )
            .await?;

            let out =
                run_checked("docker", &["inspect", "-f", "{{.State.Pid}}", &name]).await?;
            let pid: u32 = out
                .stdout
                .trim()
                .parse()
                .map_err(|_| VnfError::NetworkStartFailed {
                    message: format!("no PID for host container {name}: '{}'", out.stdout.trim()),
                })?;
            HostNamespace::of_pid(pid).loopback_up().await?;
            Ok::<_, VnfError>(pid)
        }
        .await;

        match created {
            Ok(pid) => {
                self.pids.insert(host.id.clone(), pid);
                tracing::info!(host = %host.id, pid, address = %host.address, "Host created");
                Ok(())
            }
            Err(e) => {
                discard_container(&name).await;
                Err(e)
            }
        }
    }

    async fn create_link(&self, link: &LinkPlan) -> VnfResult<()> {
        let (a, b) = self.veth_names(link);
        VethPair::create(&a, &b).await?;

        let attached = async {
            self.attach_end(&link.a, &a).await?;
            self.attach_end(&link.b, &b).await
        }
        .await;

        if let Err(e) = attached {
            for end in [&a, &b] {
                if let Err(cleanup) = VethPair::delete(end).await {
                    tracing::debug!(interface = %end, error = %cleanup, "Could not clean up veth end");
                }
            }
            return Err(e);
        }

        tracing::info!(link = link.index, a = %link.a.node, b = %link.b.node, "Link created");
        Ok(())
    }

    async fn shape_link(&self, link: &LinkPlan, shaping: &LinkShaping) -> VnfResult<()> {
        let (a, b) = self.veth_names(link);
        self.shape_end(&link.a, &a, shaping).await?;
        self.shape_end(&link.b, &b, shaping).await?;
        tracing::info!(link = link.index, %shaping, "Link shaped");
        Ok(())
    }

    async fn destroy_link(&self, link: &LinkPlan) -> VnfResult<()> {
        // Deleting either end removes the pair; whichever end still sits in
        // the root namespace will do.
        let (a, b) = self.veth_names(link);
        for (end, name) in [(&link.a, a), (&link.b, b)] {
            if end.kind == NodeKind::Switch {
                return VethPair::delete(&name).await;
            }
        }
        Ok(())
    }

    async fn destroy_host(&self, host: &Host) -> VnfResult<()> {
        let name = self.host_container(&host.id);
        self.pids.remove(&host.id);
        let out = run("docker", &["rm", "-f", &name]).await?;
        if !out.success() {
            tracing::warn!(host = %host.id, stderr = %out.stderr, "Failed to remove host container");
        }
        Ok(())
    }

    async fn destroy_switch(&self, switch: &Switch) -> VnfResult<()> {
        Bridge::named(&self.bridge_name(&switch.id)).delete().await
    }

    async fn destroy_controller(&self, controller: &Controller) -> VnfResult<()> {
        tracing::debug!(controller = %controller, "Controller stopped");
        Ok(())
    }

    async fn exec(&self, host: &NodeId, command: &str) -> VnfResult<CommandOutput> {
        if !self.pids.contains_key(host) {
            return Err(VnfError::HostNotFound {
                host: host.to_string(),
            });
        }
        run(
            "docker",
            &["exec", &self.host_container(host), "sh", "-c", command],
        )
        .await
    }

    fn attachment(&self, host: &NodeId) -> Option<String> {
        self.pids
            .contains_key(host)
            .then(|| self.host_container(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::plan_links;
    use crate::topology::Topology;

    fn backend() -> LinuxBackend {
        LinuxBackend::with_prefix(RunPrefix::fixed("vtest"))
    }

    #[test]
    fn kernel_names_fit_ifnamsiz() {
        let b = backend();
        let id = NodeId::new("abcdefghij").unwrap();
        assert!(b.bridge_name(&id).len() <= 15);

        let topo = Topology::streaming_default(10.0, 5.0).unwrap();
        for plan in plan_links(&topo) {
            let (a, z) = b.veth_names(&plan);
            assert!(a.len() <= 15 && z.len() <= 15);
        }
    }

    #[test]
    fn names_are_prefixed() {
        let b = backend();
        let s1 = NodeId::new("s1").unwrap();
        let server = NodeId::new("server").unwrap();
        assert_eq!(b.bridge_name(&s1), "vtests1");
        assert_eq!(b.host_container(&server), "vtest.server");

        let topo = Topology::streaming_default(10.0, 5.0).unwrap();
        let plans = plan_links(&topo);
        assert_eq!(b.veth_names(&plans[1]), ("vtestl1a".into(), "vtestl1b".into()));
    }

    #[tokio::test]
    async fn exec_on_unknown_host_fails() {
        let b = backend();
        let err = b
            .exec(&NodeId::new("ghost").unwrap(), "true")
            .await
            .unwrap_err();
        assert!(matches!(err, VnfError::HostNotFound { .. }));
        assert!(b.attachment(&NodeId::new("ghost").unwrap()).is_none());
    }
}
