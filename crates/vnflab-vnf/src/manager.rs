//! Container lifecycle on emulated hosts.
//!
//! A container placed on a host shares that host's network namespace, so
//! its traffic crosses the emulated links and their shaping.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use vnflab_common::command::{discard_container, run, run_attached};
use vnflab_common::{RunPrefix, VnfError, VnfResult};

use crate::mount::MountSpec;

/// Everything needed to place one container on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    /// Logical container name, unique per run.
    pub name: String,
    /// Host the container is placed on.
    pub host: String,
    /// Container owning the host's network namespace.
    pub attachment: String,
    /// Image reference.
    pub image: String,
    /// Workload command line, run later with
    /// [`ContainerManager::exec_blocking`].
    pub entry: String,
    /// Bind mounts.
    pub mounts: Vec<MountSpec>,
}

/// A created container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Logical name.
    pub name: String,
    /// Name known to the runtime.
    pub runtime_name: String,
    /// Host the container is placed on.
    pub host: String,
    /// Image reference.
    pub image: String,
    /// Workload command line.
    pub entry: String,
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

/// What [`ContainerManager::remove`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The container was stopped and deleted.
    Removed,
    /// The container was already gone.
    AlreadyGone,
}

/// Creates, drives and removes containers.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Create and start a container.
    ///
    /// Fails with [`VnfError::DuplicateIdentity`] if the name is in use,
    /// [`VnfError::MountConflict`] for clashing mounts,
    /// [`VnfError::ImageNotFound`] for an unknown image and
    /// [`VnfError::HostNotFound`] if the host is not running.
    async fn create(&self, request: ContainerRequest) -> VnfResult<ContainerHandle>;

    /// Stop and delete a container. Removing a container twice is not an
    /// error.
    async fn remove(&self, handle: &ContainerHandle) -> VnfResult<RemoveOutcome>;

    /// Run a shell command line in the container and wait for it to exit.
    async fn exec_blocking(&self, handle: &ContainerHandle, command: &str) -> VnfResult<i32>;
}

/// [`ContainerManager`] backed by the docker CLI.
pub struct DockerManager {
    prefix: RunPrefix,
    live: DashMap<String, ContainerHandle>,
}

impl DockerManager {
    /// Manager naming its containers under `prefix`.
    #[must_use]
    pub fn new(prefix: RunPrefix) -> Self {
        Self {
            prefix,
            live: DashMap::new(),
        }
    }

    /// Runtime name for a logical container name.
    #[must_use]
    pub fn runtime_name(&self, name: &str) -> String {
        format!("{}.{}", self.prefix, name)
    }

    /// Names of containers created and not yet removed.
    pub fn live(&self) -> Vec<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    /// Arguments for `docker run`.
    ///
    /// `-t` keeps an interactive default command such as a shell alive, so
    /// workloads can be started later with `docker exec`.
    #[must_use]
    pub fn run_args(&self, request: &ContainerRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "-t".to_string(),
            "--name".to_string(),
            self.runtime_name(&request.name),
            "--network".to_string(),
            format!("container:{}", request.attachment),
        ];
        for mount in &request.mounts {
            args.push("-v".to_string());
            args.push(mount.volume_arg());
        }
        args.push(request.image.clone());
        args
    }

    async fn image_exists(image: &str) -> VnfResult<bool> {
        Ok(run("docker", &["image", "inspect", image]).await?.success())
    }

    async fn attachment_running(attachment: &str) -> VnfResult<bool> {
        let out = run(
            "docker",
            &["inspect", "-f", "{{.State.Running}}", attachment],
        )
        .await?;
        Ok(out.success() && out.stdout.trim() == "true")
    }
}

#[async_trait]
impl ContainerManager for DockerManager {
    async fn create(&self, request: ContainerRequest) -> VnfResult<ContainerHandle> {
        if self.live.contains_key(&request.name) {
            return Err(VnfError::DuplicateIdentity { id: request.name });
        }
        MountSpec::check_conflicts(&request.mounts)?;
        if !Self::image_exists(&request.image).await? {
            return Err(VnfError::ImageNotFound {
                reference: request.image,
            });
        }
        if !Self::attachment_running(&request.attachment).await? {
            return Err(VnfError::HostNotFound { host: request.host });
        }

        let runtime_name = self.runtime_name(&request.name);
        tracing::info!(
            container = %request.name,
            host = %request.host,
            image = %request.image,
            "Creating container"
        );

        let args = self.run_args(&request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = run("docker", &args).await?;
        if !out.success() {
            // The container may exist in the created state.
            discard_container(&runtime_name).await;
            return Err(VnfError::CommandFailed {
                command: format!("docker run {}", request.name),
                stderr: out.stderr,
            });
        }

        let handle = ContainerHandle {
            name: request.name.clone(),
            runtime_name,
            host: request.host,
            image: request.image,
            entry: request.entry,
        };
        self.live.insert(request.name, handle.clone());
        Ok(handle)
    }

    async fn remove(&self, handle: &ContainerHandle) -> VnfResult<RemoveOutcome> {
        if self.live.remove(&handle.name).is_none() {
            tracing::warn!(container = %handle.name, "Container already removed");
            return Ok(RemoveOutcome::AlreadyGone);
        }

        tracing::info!(container = %handle.name, "Removing container");
        let out = run("docker", &["rm", "-f", &handle.runtime_name]).await?;
        if out.success() {
            Ok(RemoveOutcome::Removed)
        } else {
            tracing::warn!(container = %handle.name, stderr = %out.stderr, "Container vanished before removal");
            Ok(RemoveOutcome::AlreadyGone)
        }
    }

    async fn exec_blocking(&self, handle: &ContainerHandle, command: &str) -> VnfResult<i32> {
        if !self.live.contains_key(&handle.name) {
            return Err(VnfError::ContainerNotFound {
                name: handle.name.clone(),
            });
        }
        tracing::debug!(container = %handle.name, command, "Executing workload");
        run_attached(
            "docker",
            &["exec", &handle.runtime_name, "bash", "-c", command],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ContainerRequest {
        ContainerRequest {
            name: "streaming_server".to_string(),
            host: "server".to_string(),
            attachment: "vtest.server".to_string(),
            image: "video_streaming_server".to_string(),
            entry: "cd /home && ./video_streaming.py".to_string(),
            mounts: vec![MountSpec::read_write("/srv/lab/pcap", "/home/pcap/")],
        }
    }

    #[test]
    fn run_args_join_host_namespace() {
        let manager = DockerManager::new(RunPrefix::fixed("vtest"));
        insta::assert_snapshot!(manager.run_args(&request()).join(" "), @"run -d -t --name vtest.streaming_server --network container:vtest.server -v /srv/lab/pcap:/home/pcap/:rw video_streaming_server");
    }

    #[tokio::test]
    async fn remove_unknown_is_already_gone() {
        let manager = DockerManager::new(RunPrefix::fixed("vtest"));
        let handle = ContainerHandle {
            name: "nobody".into(),
            runtime_name: "vtest.nobody".into(),
            host: "server".into(),
            image: "x".into(),
            entry: "true".into(),
        };
        assert_eq!(manager.remove(&handle).await.unwrap(), RemoveOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn exec_on_unknown_container_fails() {
        let manager = DockerManager::new(RunPrefix::fixed("vtest"));
        let handle = ContainerHandle {
            name: "nobody".into(),
            runtime_name: "vtest.nobody".into(),
            host: "server".into(),
            image: "x".into(),
            entry: "true".into(),
        };
        let err = manager.exec_blocking(&handle, "true").await.unwrap_err();
        assert!(matches!(err, VnfError::ContainerNotFound { .. }));
    }
}
