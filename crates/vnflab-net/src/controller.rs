//! The control plane registered with an emulated network.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How switches learn forwarding state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Switches run their built-in MAC learning; no external controller.
    #[default]
    Standalone,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// Control plane for the switches.
///
/// Created before any other entity when the network starts and destroyed
/// after every other entity when it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    /// Controller name.
    pub name: String,
    /// Controller kind.
    #[serde(default)]
    pub kind: ControllerKind,
}

impl Controller {
    /// A standalone controller.
    #[must_use]
    pub fn standalone(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ControllerKind::Standalone,
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::standalone("c0")
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_standalone_c0() {
        let c = Controller::default();
        assert_eq!(c.name, "c0");
        assert_eq!(c.kind, ControllerKind::Standalone);
        assert_eq!(c.to_string(), "c0 (standalone)");
    }
}
