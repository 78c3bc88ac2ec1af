//! Virtual ethernet pair management.

use vnflab_common::VnfResult;
use vnflab_common::command::{run, run_checked};

/// Virtual ethernet pair backing one link.
#[derive(Debug, Clone)]
pub struct VethPair {
    /// First end, named after the link's first endpoint.
    pub a: String,
    /// Second end.
    pub b: String,
}

impl VethPair {
    /// Create a new veth pair in the root namespace.
    ///
    /// A stale pair with the same name is removed first.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip link add` fails, or if `ip` cannot be spawned
    /// to remove a stale pair.
    pub async fn create(a: &str, b: &str) -> VnfResult<Self> {
        tracing::debug!(a, b, "Creating veth pair");

        Self::delete(a).await?;
        run_checked(
            "ip",
            &["link", "add", a, "type", "veth", "peer", "name", b],
        )
        .await?;

        Ok(Self {
            a: a.to_string(),
            b: b.to_string(),
        })
    }

    /// Move one end into the network namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip link set netns` fails.
    pub async fn move_to_netns(interface: &str, pid: u32) -> VnfResult<()> {
        tracing::debug!(interface, pid, "Moving to netns");
        run_checked("ip", &["link", "set", interface, "netns", &pid.to_string()]).await?;
        Ok(())
    }

    /// Delete the pair through one of its ends. Missing pairs are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if `ip` cannot be spawned.
    pub async fn delete(interface: &str) -> VnfResult<()> {
        tracing::debug!(interface, "Deleting veth pair");

        let out = run("ip", &["link", "delete", interface]).await?;
        if !out.success() {
            tracing::debug!(interface, stderr = %out.stderr, "veth already gone");
        }

        Ok(())
    }
}
