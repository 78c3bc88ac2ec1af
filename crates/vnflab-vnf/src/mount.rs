//! Bind mounts from the host filesystem into containers.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vnflab_common::{VnfError, VnfResult};

fn default_read_write() -> bool {
    true
}

/// A host directory bound into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Source on the host. Relative paths are resolved by [`MountSpec::resolve`].
    pub host_path: PathBuf,
    /// Target inside the container.
    pub container_path: String,
    /// Whether the container may write.
    #[serde(default = "default_read_write")]
    pub read_write: bool,
}

impl MountSpec {
    /// A read-write mount.
    #[must_use]
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_write: true,
        }
    }

    /// A read-only mount.
    #[must_use]
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            read_write: false,
            ..Self::read_write(host_path, container_path)
        }
    }

    /// Anchor a relative host path at `base`.
    #[must_use]
    pub fn resolve(mut self, base: &Path) -> Self {
        if self.host_path.is_relative() {
            self.host_path = base.join(&self.host_path);
        }
        self
    }

    /// Value for `docker run -v`.
    #[must_use]
    pub fn volume_arg(&self) -> String {
        let mode = if self.read_write { "rw" } else { "ro" };
        format!("{}:{}:{mode}", self.host_path.display(), self.container_path)
    }

    /// Reject mount sets where two entries target the same container path.
    ///
    /// Trailing slashes are ignored when comparing.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::MountConflict`] naming the first duplicated path.
    pub fn check_conflicts(mounts: &[Self]) -> VnfResult<()> {
        let mut seen = HashSet::new();
        for mount in mounts {
            let target = mount.container_path.trim_end_matches('/');
            let target = if target.is_empty() { "/" } else { target };
            if !seen.insert(target) {
                return Err(VnfError::MountConflict {
                    container_path: mount.container_path.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.volume_arg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_arg_modes() {
        let rw = MountSpec::read_write("/srv/lab/pcap", "/home/pcap/");
        assert_eq!(rw.volume_arg(), "/srv/lab/pcap:/home/pcap/:rw");
        let ro = MountSpec::read_only("/etc/hosts", "/etc/hosts");
        assert_eq!(ro.volume_arg(), "/etc/hosts:/etc/hosts:ro");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let m = MountSpec::read_write("pcap", "/home/pcap/").resolve(Path::new("/opt/lab"));
        assert_eq!(m.host_path, PathBuf::from("/opt/lab/pcap"));

        let abs = MountSpec::read_write("/data", "/data").resolve(Path::new("/opt/lab"));
        assert_eq!(abs.host_path, PathBuf::from("/data"));
    }

    #[test]
    fn conflicting_targets_rejected() {
        let mounts = [
            MountSpec::read_write("/a", "/home/pcap/"),
            MountSpec::read_only("/b", "/home/pcap"),
        ];
        let err = MountSpec::check_conflicts(&mounts).unwrap_err();
        assert!(matches!(err, VnfError::MountConflict { .. }));
    }

    #[test]
    fn distinct_targets_accepted() {
        let mounts = [
            MountSpec::read_write("/a", "/home/pcap/"),
            MountSpec::read_write("/a", "/home/logs/"),
        ];
        assert!(MountSpec::check_conflicts(&mounts).is_ok());
    }

    #[test]
    fn deserializes_with_default_mode() {
        let m: MountSpec =
            serde_json::from_str(r#"{"host_path":"pcap","container_path":"/home/pcap/"}"#).unwrap();
        assert!(m.read_write);
    }
}
