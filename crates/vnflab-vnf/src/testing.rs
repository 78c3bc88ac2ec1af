//! In-memory container manager for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use vnflab_common::{VnfError, VnfResult};

use crate::manager::{ContainerHandle, ContainerManager, ContainerRequest, RemoveOutcome};
use crate::mount::MountSpec;

/// Scripted behaviour of one container's workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Script {
    /// Exit code returned by `exec_blocking`.
    pub exit_code: i32,
    /// How long `exec_blocking` takes.
    pub delay: Duration,
}

/// Manager that keeps containers in memory.
#[derive(Debug, Default)]
pub struct InMemoryManager {
    images: Option<HashSet<String>>,
    hosts: Option<HashSet<String>>,
    scripts: DashMap<String, Script>,
    start_failures: HashSet<String>,
    existing: DashMap<String, String>,
    live: DashMap<String, ContainerHandle>,
    requests: DashMap<String, ContainerRequest>,
    removals: AtomicUsize,
    execs: AtomicUsize,
}

impl InMemoryManager {
    /// A manager accepting any image on any host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only these images exist.
    #[must_use]
    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = Some(images.into_iter().map(Into::into).collect());
        self
    }

    /// Only these hosts are running.
    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Script the workload of `container`.
    #[must_use]
    pub fn with_script(self, container: &str, exit_code: i32, delay: Duration) -> Self {
        self.scripts
            .insert(container.to_string(), Script { exit_code, delay });
        self
    }

    /// `container` is created by the runtime but fails to start.
    #[must_use]
    pub fn with_failed_start(mut self, container: &str) -> Self {
        self.start_failures.insert(container.to_string());
        self
    }

    /// Runtime names of every container the runtime still holds, started
    /// or not.
    pub fn existing(&self) -> Vec<String> {
        self.existing.iter().map(|e| e.value().clone()).collect()
    }

    /// Names of live containers.
    pub fn live(&self) -> Vec<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    /// The request a live container was created from.
    pub fn request(&self, name: &str) -> Option<ContainerRequest> {
        self.requests.get(name).map(|r| r.clone())
    }

    /// Containers actually removed.
    pub fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }

    /// Workloads executed.
    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerManager for InMemoryManager {
    async fn create(&self, request: ContainerRequest) -> VnfResult<ContainerHandle> {
        if self.live.contains_key(&request.name) {
            return Err(VnfError::DuplicateIdentity { id: request.name });
        }
        MountSpec::check_conflicts(&request.mounts)?;
        if self
            .images
            .as_ref()
            .is_some_and(|images| !images.contains(&request.image))
        {
            return Err(VnfError::ImageNotFound {
                reference: request.image,
            });
        }
        if self
            .hosts
            .as_ref()
            .is_some_and(|hosts| !hosts.contains(&request.host))
        {
            return Err(VnfError::HostNotFound { host: request.host });
        }

        let runtime_name = format!("mem.{}", request.name);
        self.existing
            .insert(request.name.clone(), runtime_name.clone());
        if self.start_failures.contains(&request.name) {
            self.existing.remove(&request.name);
            return Err(VnfError::CommandFailed {
                command: format!("docker run {}", request.name),
                stderr: "container failed to start".to_string(),
            });
        }

        let handle = ContainerHandle {
            name: request.name.clone(),
            runtime_name,
            host: request.host.clone(),
            image: request.image.clone(),
            entry: request.entry.clone(),
        };
        self.live.insert(request.name.clone(), handle.clone());
        self.requests.insert(request.name.clone(), request);
        Ok(handle)
    }

    async fn remove(&self, handle: &ContainerHandle) -> VnfResult<RemoveOutcome> {
        if self.live.remove(&handle.name).is_none() {
            tracing::warn!(container = %handle.name, "Container already removed");
            return Ok(RemoveOutcome::AlreadyGone);
        }
        self.requests.remove(&handle.name);
        self.existing.remove(&handle.name);
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(RemoveOutcome::Removed)
    }

    async fn exec_blocking(&self, handle: &ContainerHandle, _command: &str) -> VnfResult<i32> {
        if !self.live.contains_key(&handle.name) {
            return Err(VnfError::ContainerNotFound {
                name: handle.name.clone(),
            });
        }
        self.execs.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(&handle.name)
            .map(|s| *s)
            .unwrap_or_default();
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        Ok(script.exit_code)
    }
}
