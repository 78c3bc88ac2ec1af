//! Scenario configuration.
//!
//! A scenario names the topology, the VNFs placed on it and the
//! connectivity probe. The built-in default is the two-host video
//! streaming deployment; a YAML file can describe any other.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vnflab_common::{CAPTURE_MOUNT_POINT, VnfError, VnfResult};
use vnflab_net::{HostRole, LinkShaping, Topology};
use vnflab_vnf::MountSpec;

/// Default shaped bandwidth, Mbit/s.
pub const DEFAULT_BANDWIDTH_MBIT: f64 = 10.0;

/// Default shaped delay, ms.
pub const DEFAULT_DELAY_MS: f64 = 5.0;

/// A complete run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Image for host containers.
    #[serde(default = "default_host_image")]
    pub host_image: String,

    /// Hosts.
    pub hosts: Vec<HostSpec>,

    /// Switch names.
    #[serde(default)]
    pub switches: Vec<String>,

    /// Links.
    #[serde(default)]
    pub links: Vec<LinkSpec>,

    /// Network functions.
    #[serde(default)]
    pub vnfs: Vec<VnfSpec>,

    /// Connectivity probe.
    #[serde(default)]
    pub probe: Option<ProbeSpec>,

    /// Directory containing the scenario file.
    #[serde(skip)]
    pub base_path: PathBuf,
}

fn default_host_image() -> String {
    vnflab_net::linux::DEFAULT_HOST_IMAGE.to_string()
}

/// A host entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Host name.
    pub name: String,
    /// Address, `a.b.c.d` or `a.b.c.d/len`.
    pub ip: String,
    /// Role tag.
    #[serde(default)]
    pub role: Option<HostRole>,
}

/// A link entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// First endpoint.
    pub a: String,
    /// Second endpoint.
    pub b: String,
    /// Bandwidth (`bw`) and delay (`delay`).
    #[serde(flatten)]
    pub shaping: LinkShaping,
}

impl LinkSpec {
    fn shaping(&self) -> Option<LinkShaping> {
        (self.shaping.bandwidth_mbit.is_some() || self.shaping.delay_ms.is_some())
            .then_some(self.shaping)
    }
}

/// A network function placed on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnfSpec {
    /// Container name.
    pub name: String,
    /// Host the container is placed on.
    pub host: String,
    /// Image reference.
    pub image: String,
    /// Workload command line.
    pub entry: String,
    /// Mount the capture directory at `/home/pcap/`.
    #[serde(default = "default_true")]
    pub capture: bool,
    /// Additional mounts; relative host paths are taken from the scenario
    /// file's directory.
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

fn default_true() -> bool {
    true
}

impl VnfSpec {
    /// Every mount of this VNF, with the capture directory first.
    #[must_use]
    pub fn resolved_mounts(&self, base: &Path, captures: &Path) -> Vec<MountSpec> {
        let capture = self
            .capture
            .then(|| MountSpec::read_write(captures, CAPTURE_MOUNT_POINT));
        capture
            .into_iter()
            .chain(self.mounts.iter().cloned().map(|m| m.resolve(base)))
            .collect()
    }
}

/// Echo probe run after the network starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Probing host.
    pub from: String,
    /// Probed address.
    pub to: Ipv4Addr,
    /// Echo requests to send.
    #[serde(default = "default_probe_count")]
    pub count: u32,
}

fn default_probe_count() -> u32 {
    5
}

impl Default for Scenario {
    fn default() -> Self {
        Self::streaming(DEFAULT_BANDWIDTH_MBIT, DEFAULT_DELAY_MS)
    }
}

impl Scenario {
    /// The video streaming deployment with the given shaping on `s1`–`s2`.
    #[must_use]
    pub fn streaming(bandwidth_mbit: f64, delay_ms: f64) -> Self {
        let host = |name: &str, ip: &str, role| HostSpec {
            name: name.to_string(),
            ip: ip.to_string(),
            role: Some(role),
        };
        let link = |a: &str, b: &str, shaping| LinkSpec {
            a: a.to_string(),
            b: b.to_string(),
            shaping,
        };
        let vnf = |name: &str, host: &str, image: &str, entry: &str| VnfSpec {
            name: name.to_string(),
            host: host.to_string(),
            image: image.to_string(),
            entry: entry.to_string(),
            capture: true,
            mounts: Vec::new(),
        };

        Self {
            host_image: default_host_image(),
            hosts: vec![
                host("server", "10.0.0.1", HostRole::Server),
                host("client", "10.0.0.2", HostRole::Client),
            ],
            switches: vec!["s1".to_string(), "s2".to_string()],
            links: vec![
                link("s1", "server", LinkShaping::default()),
                link(
                    "s1",
                    "s2",
                    LinkShaping {
                        bandwidth_mbit: Some(bandwidth_mbit),
                        delay_ms: Some(delay_ms),
                    },
                ),
                link("s2", "client", LinkShaping::default()),
            ],
            vnfs: vec![
                vnf(
                    "streaming_server",
                    "server",
                    "video_streaming_server",
                    "cd /home && ./video_streaming.py",
                ),
                vnf(
                    "streaming_client",
                    "client",
                    "video_streaming_client",
                    "cd /home && ./get_video_streamed.py",
                ),
            ],
            probe: Some(ProbeSpec {
                from: "client".to_string(),
                to: Ipv4Addr::new(10, 0, 0, 1),
                count: default_probe_count(),
            }),
            base_path: PathBuf::new(),
        }
    }

    /// Parse from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::Serialization`] for malformed YAML.
    pub fn from_yaml(yaml: &str) -> VnfResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> VnfResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VnfError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        let mut scenario = Self::from_yaml(&content)?;
        scenario.base_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(scenario)
    }

    /// Replace bandwidth and/or delay on every shaped link.
    #[must_use]
    pub fn with_shaping_overrides(mut self, bandwidth_mbit: Option<f64>, delay_ms: Option<f64>) -> Self {
        for link in self.links.iter_mut().filter(|l| l.shaping().is_some()) {
            if let Some(bw) = bandwidth_mbit {
                link.shaping.bandwidth_mbit = Some(bw);
            }
            if let Some(delay) = delay_ms {
                link.shaping.delay_ms = Some(delay);
            }
        }
        self
    }

    /// Build the topology graph.
    ///
    /// # Errors
    ///
    /// Returns the first graph construction error, or
    /// [`VnfError::Config`] for a malformed address.
    pub fn topology(&self) -> VnfResult<Topology> {
        let mut topo = Topology::new();
        for host in &self.hosts {
            let address: vnflab_net::HostAddress = host.ip.parse()?;
            match host.role {
                Some(role) => topo.add_host_with_role(&host.name, address, role)?,
                None => topo.add_host(&host.name, address)?,
            };
        }
        for switch in &self.switches {
            topo.add_switch(switch)?;
        }
        for link in &self.links {
            topo.add_link(&link.a, &link.b, link.shaping())?;
        }
        Ok(topo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_streaming_deployment() {
        let scenario = Scenario::default();
        let topo = scenario.topology().unwrap();
        assert_eq!(topo.hosts().len(), 2);
        assert_eq!(topo.shaped_links().count(), 1);
        assert_eq!(scenario.host_image, "dev_test");
        assert_eq!(scenario.vnfs[0].image, "video_streaming_server");
        assert_eq!(scenario.vnfs[1].entry, "cd /home && ./get_video_streamed.py");

        let probe = scenario.probe.unwrap();
        assert_eq!(probe.from, "client");
        assert_eq!(probe.to, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(probe.count, 5);
    }

    #[test]
    fn overrides_only_touch_shaped_links() {
        let scenario = Scenario::default().with_shaping_overrides(Some(2.0), None);
        let topo = scenario.topology().unwrap();
        let shaped: Vec<_> = topo.shaped_links().collect();
        assert_eq!(shaped.len(), 1);
        let shaping = shaped[0].shaping.unwrap();
        assert_eq!(shaping.bandwidth_mbit, Some(2.0));
        assert_eq!(shaping.delay_ms, Some(5.0));
    }

    #[test]
    fn negative_override_fails_topology() {
        let scenario = Scenario::default().with_shaping_overrides(None, Some(-1.0));
        assert!(matches!(
            scenario.topology(),
            Err(VnfError::InvalidShaping { parameter: "delay", .. })
        ));
    }

    #[test]
    fn capture_mount_comes_first() {
        let scenario = Scenario::default();
        let mounts =
            scenario.vnfs[0].resolved_mounts(Path::new("/opt/lab"), Path::new("/opt/lab/pcap"));
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].volume_arg(), "/opt/lab/pcap:/home/pcap/:rw");
    }

    #[test]
    fn parse_yaml_scenario() {
        let yaml = r#"
hosts:
  - name: h1
    ip: 10.0.0.1
  - name: h2
    ip: 10.0.0.2/24
switches: [s1]
links:
  - { a: s1, b: h1, bw: 100 }
  - { a: s1, b: h2, delay: 20 }
vnfs:
  - name: sink
    host: h2
    image: alpine
    entry: nc -l -p 9000
    capture: false
    mounts:
      - host_path: data
        container_path: /data
probe:
  from: h2
  to: 10.0.0.1
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.host_image, "dev_test");
        assert_eq!(scenario.links[0].shaping.bandwidth_mbit, Some(100.0));
        assert_eq!(scenario.links[1].shaping.delay_ms, Some(20.0));
        assert_eq!(scenario.probe.as_ref().unwrap().count, 5);

        let topo = scenario.topology().unwrap();
        assert_eq!(topo.host("h2").unwrap().address.prefix_len, 24);
        assert_eq!(topo.shaped_links().count(), 2);

        let mounts = scenario.vnfs[0].resolved_mounts(Path::new("/srv"), Path::new("/srv/pcap"));
        assert_eq!(mounts, vec![MountSpec::read_write("/srv/data", "/data")]);
    }

    #[test]
    fn bad_address_is_config_error() {
        let mut scenario = Scenario::default();
        scenario.hosts[0].ip = "10.0.0".to_string();
        assert!(matches!(scenario.topology(), Err(VnfError::Config { .. })));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Scenario::from_file(Path::new("/nonexistent/scenario.yaml")).unwrap_err();
        assert!(matches!(err, VnfError::Config { .. }));
    }
}
