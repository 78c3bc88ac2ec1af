//! # vnflab-vnf
//!
//! Containerized network functions: placing containers on emulated hosts,
//! and running their workloads concurrently to completion.

#![warn(missing_docs)]

pub mod driver;
pub mod manager;
pub mod mount;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use driver::{WorkloadOutcome, WorkloadRun, WorkloadSummary, WorkloadUnit, run_all};
pub use manager::{ContainerHandle, ContainerManager, ContainerRequest, DockerManager, RemoveOutcome};
pub use mount::MountSpec;
