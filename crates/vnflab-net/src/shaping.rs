//! Link shaping: emulated bandwidth and propagation delay.
//!
//! Shaping is applied with `tc`. Bandwidth is enforced by a TBF root qdisc
//! that drops excess packets, with netem chained beneath it for delay. A
//! delay-only link gets netem as the root qdisc.

use serde::{Deserialize, Serialize};
use vnflab_common::{VnfError, VnfResult};

/// Bandwidth (Mbit/s) and delay (ms) applied to a link.
///
/// `None` and zero both mean "not shaped" for that parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkShaping {
    /// Bandwidth limit in Mbit/s.
    #[serde(default, rename = "bw", skip_serializing_if = "Option::is_none")]
    pub bandwidth_mbit: Option<f64>,
    /// One-way delay in milliseconds.
    #[serde(default, rename = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<f64>,
}

impl LinkShaping {
    /// Shaping with both parameters; zero disables a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::InvalidShaping`] for negative or non-finite values.
    pub fn new(bandwidth_mbit: f64, delay_ms: f64) -> VnfResult<Self> {
        let shaping = Self {
            bandwidth_mbit: Some(bandwidth_mbit),
            delay_ms: Some(delay_ms),
        };
        shaping.validate()?;
        Ok(shaping)
    }

    /// Bandwidth-only shaping.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::InvalidShaping`] for negative or non-finite values.
    pub fn bandwidth(mbit: f64) -> VnfResult<Self> {
        let shaping = Self {
            bandwidth_mbit: Some(mbit),
            delay_ms: None,
        };
        shaping.validate()?;
        Ok(shaping)
    }

    /// Delay-only shaping.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::InvalidShaping`] for negative or non-finite values.
    pub fn delay(ms: f64) -> VnfResult<Self> {
        let shaping = Self {
            bandwidth_mbit: None,
            delay_ms: Some(ms),
        };
        shaping.validate()?;
        Ok(shaping)
    }

    /// Check both parameters are finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::InvalidShaping`] naming the offending parameter.
    pub fn validate(&self) -> VnfResult<()> {
        for (parameter, value) in [
            ("bandwidth", self.bandwidth_mbit),
            ("delay", self.delay_ms),
        ] {
            match value {
                Some(value) if !value.is_finite() || value < 0.0 => {
                    return Err(VnfError::InvalidShaping { parameter, value });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn effective_bandwidth(&self) -> Option<f64> {
        self.bandwidth_mbit.filter(|bw| *bw > 0.0)
    }

    fn effective_delay(&self) -> Option<f64> {
        self.delay_ms.filter(|d| *d > 0.0)
    }

    /// True if applying this shaping would be a no-op.
    #[must_use]
    pub fn is_unshaped(&self) -> bool {
        self.effective_bandwidth().is_none() && self.effective_delay().is_none()
    }

    /// `tc` invocations (arguments after `tc`) that install this shaping on
    /// `interface`. Empty when unshaped.
    #[must_use]
    pub fn tc_commands(&self, interface: &str) -> Vec<Vec<String>> {
        let dev = |rest: &[&str]| -> Vec<String> {
            ["qdisc", "add", "dev", interface]
                .iter()
                .chain(rest)
                .map(|s| (*s).to_string())
                .collect()
        };

        match (self.effective_bandwidth(), self.effective_delay()) {
            (None, None) => Vec::new(),
            (None, Some(delay)) => {
                let delay = format!("{delay}ms");
                vec![dev(&["root", "handle", "10:", "netem", "delay", &delay])]
            }
            (Some(bw), delay) => {
                let rate_kbit = (bw * 1000.0).round().max(1.0) as u64;
                // At least one MTU worth of tokens per tick.
                let burst = (rate_kbit.saturating_mul(1000) / 8).max(15_400) / 10;
                let rate = format!("{rate_kbit}kbit");
                let burst = burst.to_string();
                let mut commands = vec![dev(&[
                    "root", "handle", "1:", "tbf", "rate", &rate, "burst", &burst, "latency",
                    "50ms",
                ])];
                if let Some(delay) = delay {
                    let delay = format!("{delay}ms");
                    commands.push(dev(&[
                        "parent", "1:1", "handle", "10:", "netem", "delay", &delay,
                    ]));
                }
                commands
            }
        }
    }
}

impl std::fmt::Display for LinkShaping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.effective_bandwidth(), self.effective_delay()) {
            (None, None) => write!(f, "unshaped"),
            (Some(bw), None) => write!(f, "{bw}Mbit"),
            (None, Some(delay)) => write!(f, "{delay}ms"),
            (Some(bw), Some(delay)) => write!(f, "{bw}Mbit/{delay}ms"),
        }
    }
}
