//! Standard filesystem paths for vnflab.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Where the capture directory is mounted inside every VNF container.
pub const CAPTURE_MOUNT_POINT: &str = "/home/pcap/";

/// Name of the capture directory created beside the entry point.
pub const CAPTURE_DIR_NAME: &str = "pcap";

/// Override for the capture directory.
pub static VNFLAB_PCAP_DIR: Lazy<Option<PathBuf>> =
    Lazy::new(|| std::env::var("VNFLAB_PCAP_DIR").map(PathBuf::from).ok());

/// Standard paths used by a vnflab run.
#[derive(Debug, Clone)]
pub struct LabPaths {
    /// Directory of the invoking entry point.
    pub base: PathBuf,
    /// Shared capture directory (default: `<base>/pcap`).
    pub captures: PathBuf,
}

impl LabPaths {
    /// Paths anchored beside the running executable.
    ///
    /// Follows `argv[0]` relative to the working directory, the same way a
    /// script locates its own directory. `VNFLAB_PCAP_DIR` overrides the
    /// capture directory.
    #[must_use]
    pub fn beside_entry_point() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let base = std::env::args_os()
            .next()
            .map(PathBuf::from)
            .and_then(|argv0| argv0.parent().map(Path::to_path_buf))
            .map_or_else(|| cwd.clone(), |dir| cwd.join(dir));
        let mut paths = Self::with_base(base);
        if let Some(dir) = VNFLAB_PCAP_DIR.as_ref() {
            paths.captures.clone_from(dir);
        }
        paths
    }

    /// Paths anchored at a custom base directory.
    #[must_use]
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let captures = base.join(CAPTURE_DIR_NAME);
        Self { base, captures }
    }

    /// Use an explicit capture directory.
    #[must_use]
    pub fn with_captures(mut self, captures: impl Into<PathBuf>) -> Self {
        self.captures = captures.into();
        self
    }

    /// Create the capture directory if absent and return its absolute path.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_captures(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.captures)?;
        let absolute = std::fs::canonicalize(&self.captures)?;
        tracing::debug!(path = %absolute.display(), "Capture directory ready");
        Ok(absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_base() {
        let paths = LabPaths::with_base("/opt/lab");
        assert_eq!(paths.captures, PathBuf::from("/opt/lab/pcap"));
    }

    #[test]
    fn explicit_captures() {
        let paths = LabPaths::with_base("/opt/lab").with_captures("/data/pcap");
        assert_eq!(paths.captures, PathBuf::from("/data/pcap"));
        assert_eq!(paths.base, PathBuf::from("/opt/lab"));
    }

    #[test]
    fn ensure_captures_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let paths = LabPaths::with_base(temp.path());
        let first = paths.ensure_captures().unwrap();
        let second = paths.ensure_captures().unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first.ends_with("pcap"));
    }

    #[test]
    fn beside_entry_point_is_absolute() {
        let paths = LabPaths::beside_entry_point();
        assert!(paths.base.is_absolute());
    }
}
