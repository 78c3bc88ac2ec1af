//! # vnflab-common
//!
//! Shared types for the vnflab workspace.
//!
//! This crate provides the pieces every other vnflab crate leans on:
//! - The error taxonomy ([`VnfError`]) split into fatal setup, soft runtime
//!   and teardown errors
//! - Validated node identifiers and per-run name prefixes
//! - Filesystem locations such as the shared capture directory
//! - A thin async wrapper around the external tools (`ip`, `tc`, `docker`)

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod id;
pub mod paths;

pub use command::CommandOutput;
pub use error::{ErrorClass, VnfError, VnfResult};
pub use id::{NodeId, RunPrefix};
pub use paths::{CAPTURE_MOUNT_POINT, LabPaths};
