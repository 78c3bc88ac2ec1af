//! Common error types for vnflab.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`VnfError`].
pub type VnfResult<T> = Result<T, VnfError>;

/// How an error affects the rest of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts the forward sequence; partial resources are rolled back.
    Fatal,
    /// Reported, but the run continues to teardown.
    Soft,
    /// Raised while tearing down; always treated as a no-op.
    Teardown,
}

/// Errors across the vnflab workspace.
#[derive(Error, Diagnostic, Debug)]
pub enum VnfError {
    /// A node or container identity was used twice.
    #[error("Duplicate identity: {id}")]
    #[diagnostic(code(vnflab::topology::duplicate_identity))]
    DuplicateIdentity {
        /// The reused identity.
        id: String,
    },

    /// A link references a node that has not been added yet.
    #[error("Unknown link endpoint: {id}")]
    #[diagnostic(
        code(vnflab::topology::unknown_endpoint),
        help("Add hosts and switches before linking them")
    )]
    UnknownEndpoint {
        /// The missing endpoint.
        id: String,
    },

    /// Negative or non-finite bandwidth/delay.
    #[error("Invalid shaping on {parameter}: {value}")]
    #[diagnostic(
        code(vnflab::topology::invalid_shaping),
        help("Bandwidth (Mbit/s) and delay (ms) must be zero or positive")
    )]
    InvalidShaping {
        /// Which parameter was rejected.
        parameter: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Hosts must always be separated by at least one switch.
    #[error("Direct host-to-host link between {a} and {b}")]
    #[diagnostic(
        code(vnflab::topology::host_to_host),
        help("Connect each host to a switch instead")
    )]
    HostToHostLink {
        /// First host.
        a: String,
        /// Second host.
        b: String,
    },

    /// A link from a node to itself.
    #[error("Link from {id} to itself")]
    #[diagnostic(code(vnflab::topology::self_link))]
    SelfLink {
        /// The node.
        id: String,
    },

    /// The topology cannot be realized as given.
    #[error("Invalid topology: {message}")]
    #[diagnostic(code(vnflab::topology::invalid))]
    TopologyInvalid {
        /// What is wrong with it.
        message: String,
    },

    /// Invalid node identifier format.
    #[error("Invalid node id: {id}")]
    #[diagnostic(
        code(vnflab::topology::invalid_id),
        help("Node ids must be alphanumeric with hyphens and underscores, 1-10 characters, starting with a letter or digit")
    )]
    InvalidNodeId {
        /// The rejected identifier.
        id: String,
    },

    /// The emulated network could not be brought up.
    #[error("Network start failed: {message}")]
    #[diagnostic(
        code(vnflab::network::start_failed),
        help("Network emulation needs root privileges, iproute2 and the sch_netem module")
    )]
    NetworkStartFailed {
        /// The underlying cause.
        message: String,
    },

    /// The host is not part of the live network.
    #[error("Host not found: {host}")]
    #[diagnostic(code(vnflab::network::host_not_found))]
    HostNotFound {
        /// The host that was looked up.
        host: String,
    },

    /// The container image could not be resolved.
    #[error("Image not found: {reference}")]
    #[diagnostic(
        code(vnflab::container::image_not_found),
        help("Build or pull the image before starting the run")
    )]
    ImageNotFound {
        /// The image reference.
        reference: String,
    },

    /// Two mounts target the same path inside the container.
    #[error("Mount conflict on {container_path}")]
    #[diagnostic(code(vnflab::container::mount_conflict))]
    MountConflict {
        /// The duplicated container-side path.
        container_path: String,
    },

    /// The container handle is unknown to the manager.
    #[error("Container not found: {name}")]
    #[diagnostic(code(vnflab::container::not_found))]
    ContainerNotFound {
        /// The container name.
        name: String,
    },

    /// A connectivity probe received no replies.
    #[error("Connectivity probe from {from} to {to} failed: {received}/{sent} replies")]
    #[diagnostic(code(vnflab::probe::failed))]
    ConnectivityProbeFailed {
        /// Probing host.
        from: String,
        /// Probed address.
        to: String,
        /// Requests sent.
        sent: u32,
        /// Replies received.
        received: u32,
    },

    /// An external tool exited unsuccessfully.
    #[error("Command failed: {command}: {stderr}")]
    #[diagnostic(code(vnflab::command))]
    CommandFailed {
        /// The command line.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// A bounded wait expired.
    #[error("Timed out after {limit:?}: {operation}")]
    #[diagnostic(code(vnflab::timeout))]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// The bound that expired.
        limit: std::time::Duration,
    },

    /// A lifecycle phase failed fatally.
    #[error("Phase {phase} failed: {source}")]
    #[diagnostic(code(vnflab::phase_failed))]
    PhaseFailed {
        /// The phase name.
        phase: String,
        /// The underlying error.
        #[source]
        source: Box<VnfError>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(vnflab::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(vnflab::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vnflab::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl VnfError {
    /// Wrap an error with the lifecycle phase it aborted.
    #[must_use]
    pub fn in_phase(self, phase: impl ToString) -> Self {
        Self::PhaseFailed {
            phase: phase.to_string(),
            source: Box::new(self),
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConnectivityProbeFailed { .. } => ErrorClass::Soft,
            Self::ContainerNotFound { .. } => ErrorClass::Teardown,
            Self::PhaseFailed { source, .. } => source.class(),
            _ => ErrorClass::Fatal,
        }
    }

    /// Name of the failed phase, if this error carries one.
    #[must_use]
    pub fn phase(&self) -> Option<&str> {
        match self {
            Self::PhaseFailed { phase, .. } => Some(phase),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for VnfError {
    fn from(err: serde_json::Error) -> Self {
        VnfError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for VnfError {
    fn from(err: serde_yaml::Error) -> Self {
        VnfError::Serialization(err.to_string())
    }
}
