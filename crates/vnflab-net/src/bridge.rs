//! Linux bridge management.
//!
//! Each emulated switch is a Linux bridge in the root namespace, running
//! the kernel's built-in MAC learning.

use vnflab_common::command::{run, run_checked};
use vnflab_common::{VnfError, VnfResult};

/// A Linux bridge standing in for a switch.
#[derive(Debug, Clone)]
pub struct Bridge {
    /// Bridge interface name.
    name: String,
}

impl Bridge {
    /// Create a bridge and bring it up. A bridge left over under the same
    /// name is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge cannot be created or brought up.
    pub async fn create(name: &str) -> VnfResult<Self> {
        tracing::debug!(name, "Creating bridge");

        let added = run("ip", &["link", "add", "name", name, "type", "bridge"]).await?;
        if !added.success() {
            if !Self::exists(name).await {
                return Err(VnfError::CommandFailed {
                    command: format!("ip link add name {name} type bridge"),
                    stderr: added.stderr,
                });
            }
            tracing::debug!(name, "Reusing existing bridge");
        }

        let bridge = Self {
            name: name.to_string(),
        };

        // With br_netfilter loaded, bridged frames would traverse the
        // iptables FORWARD chain, which docker sets to DROP.
        let nf = run(
            "ip",
            &["link", "set", name, "type", "bridge", "nf_call_iptables", "0"],
        )
        .await?;
        if !nf.success() {
            tracing::debug!(name, stderr = %nf.stderr, "Could not disable nf_call_iptables");
        }

        bridge.up().await?;

        tracing::info!(name, "Bridge created");
        Ok(bridge)
    }

    /// Refer to an existing bridge by name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Check if a link with this name exists.
    pub async fn exists(name: &str) -> bool {
        run("ip", &["link", "show", name])
            .await
            .is_ok_and(|o| o.success())
    }

    /// Get the bridge name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bring the bridge interface up.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip link set up` fails.
    pub async fn up(&self) -> VnfResult<()> {
        tracing::debug!(name = %self.name, "Bringing bridge up");
        run_checked("ip", &["link", "set", &self.name, "up"]).await?;
        Ok(())
    }

    /// Enslave an interface to the bridge and bring it up.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be attached.
    pub async fn add_interface(&self, interface: &str) -> VnfResult<()> {
        tracing::debug!(bridge = %self.name, interface, "Adding interface to bridge");

        run_checked("ip", &["link", "set", interface, "master", &self.name]).await?;
        run_checked("ip", &["link", "set", interface, "up"]).await?;

        Ok(())
    }

    /// Delete the bridge. A bridge that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ip` cannot be spawned.
    pub async fn delete(&self) -> VnfResult<()> {
        tracing::debug!(name = %self.name, "Deleting bridge");

        let out = run("ip", &["link", "delete", &self.name, "type", "bridge"]).await?;
        if !out.success() {
            tracing::warn!(name = %self.name, stderr = %out.stderr, "Failed to delete bridge (may not exist)");
        }

        Ok(())
    }
}
