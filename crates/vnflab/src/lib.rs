//! # vnflab
//!
//! Emulated network testbed for containerized network functions.
//!
//! vnflab provides:
//! - A shaped host/switch topology realized on Linux bridges and veth pairs
//! - VNF containers placed in the network namespace of their host
//! - Concurrent workload runs with per-unit results
//! - Guaranteed teardown, with an optional interactive session before it

#![warn(missing_docs)]

pub mod cli;
pub mod console;
pub mod orchestrator;
pub mod scenario;

pub use console::{OperatorSession, ScriptedSession, StdinConsole};
pub use orchestrator::{Orchestrator, Phase, ProbePolicy, RunContext, RunOptions, RunReport};
pub use scenario::Scenario;
