//! # vnflab-net
//!
//! Network emulation for vnflab: the topology graph, link shaping, the
//! emulated network and its substrates, and the connectivity probe.

#![warn(missing_docs)]

pub mod backend;
pub mod bridge;
pub mod controller;
pub mod emulator;
pub mod linux;
pub mod netns;
pub mod probe;
pub mod shaping;
pub mod topology;
pub mod veth;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{Entity, LinkEnd, LinkPlan, NetworkBackend};
pub use controller::{Controller, ControllerKind};
pub use emulator::{EmulatedNetwork, NetworkState};
pub use linux::LinuxBackend;
pub use probe::{ProbeReport, probe};
pub use shaping::LinkShaping;
pub use topology::{Host, HostAddress, HostRole, Link, NodeKind, Switch, Topology};
