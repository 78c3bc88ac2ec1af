//! Network namespace operations for emulated hosts.
//!
//! Hosts are addressed by the PID of the process that owns their network
//! namespace. Commands run through `nsenter` so the host image needs no
//! networking tools of its own.

use vnflab_common::command::{run, run_checked};
use vnflab_common::{CommandOutput, VnfResult};

use crate::topology::HostAddress;

/// The network namespace of a live host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostNamespace {
    /// PID of the namespace owner.
    pub pid: u32,
}

impl HostNamespace {
    /// Refer to the namespace of `pid`.
    #[must_use]
    pub fn of_pid(pid: u32) -> Self {
        Self { pid }
    }

    fn nsenter_args<'a>(pid: &'a str, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = vec!["-t", pid, "-n", "--"];
        full.extend_from_slice(args);
        full
    }

    /// Run a command inside this namespace, returning raw output.
    ///
    /// # Errors
    ///
    /// Returns an error only if `nsenter` cannot be spawned.
    pub async fn exec(&self, args: &[&str]) -> VnfResult<CommandOutput> {
        let pid = self.pid.to_string();
        run("nsenter", &Self::nsenter_args(&pid, args)).await
    }

    /// Run a command inside this namespace, failing if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`vnflab_common::VnfError::CommandFailed`] on a non-zero exit.
    pub async fn exec_checked(&self, args: &[&str]) -> VnfResult<CommandOutput> {
        let pid = self.pid.to_string();
        run_checked("nsenter", &Self::nsenter_args(&pid, args)).await
    }

    /// Bring up loopback.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip link set lo up` fails.
    pub async fn loopback_up(&self) -> VnfResult<()> {
        self.exec_checked(&["ip", "link", "set", "lo", "up"]).await?;
        Ok(())
    }

    /// Rename a freshly moved interface, assign its address and bring it up.
    ///
    /// # Errors
    ///
    /// Returns an error if any `ip` step fails.
    pub async fn configure_interface(
        &self,
        current: &str,
        name: &str,
        address: &HostAddress,
    ) -> VnfResult<()> {
        let cidr = address.to_string();
        self.exec_checked(&["ip", "link", "set", current, "name", name])
            .await?;
        self.exec_checked(&["ip", "addr", "add", &cidr, "dev", name])
            .await?;
        self.exec_checked(&["ip", "link", "set", name, "up"]).await?;

        tracing::debug!(pid = self.pid, interface = name, address = %cidr, "Interface configured");
        Ok(())
    }
}
