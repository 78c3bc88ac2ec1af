//! Connectivity probe: ICMP echo from one host to an address.
//!
//! The probe only measures. Whether a failed probe aborts the run is the
//! caller's decision.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vnflab_common::{VnfError, VnfResult};

use crate::backend::NetworkBackend;
use crate::emulator::EmulatedNetwork;

/// Result of a connectivity probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Probing host.
    pub from: String,
    /// Probed address.
    pub to: String,
    /// Echo requests sent.
    pub sent: u32,
    /// Echo replies received.
    pub received: u32,
    /// Round-trip time of each reply, in milliseconds.
    pub rtt_samples: Vec<f64>,
    /// Raw `ping` output.
    #[serde(skip)]
    pub transcript: String,
}

impl ProbeReport {
    /// At least one reply came back.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.received > 0
    }

    /// Percentage of requests without a reply.
    #[must_use]
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        f64::from(self.sent.saturating_sub(self.received)) * 100.0 / f64::from(self.sent)
    }

    /// Mean round-trip time, if any reply carried one.
    #[must_use]
    pub fn mean_rtt(&self) -> Option<Duration> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        let mean = self.rtt_samples.iter().sum::<f64>() / self.rtt_samples.len() as f64;
        Some(Duration::from_secs_f64(mean / 1000.0))
    }

    /// Turn an unsuccessful report into an error.
    ///
    /// # Errors
    ///
    /// Returns [`VnfError::ConnectivityProbeFailed`] if no reply came back.
    pub fn into_result(self) -> VnfResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(VnfError::ConnectivityProbeFailed {
                from: self.from,
                to: self.to,
                sent: self.sent,
                received: self.received,
            })
        }
    }
}

/// Parse a `ping` transcript.
///
/// Falls back to `requested` sent and zero received when the summary line
/// is missing.
#[must_use]
pub fn parse_transcript(transcript: &str, requested: u32) -> (u32, u32, Vec<f64>) {
    let rtt_samples = transcript
        .lines()
        .filter_map(|line| {
            let rest = line.split("time=").nth(1)?;
            let num = rest.split_whitespace().next()?;
            num.parse().ok()
        })
        .collect();

    let summary = transcript.lines().find_map(|line| {
        let (sent, rest) = line.split_once(" packets transmitted, ")?;
        let received = rest.split_whitespace().next()?;
        Some((sent.trim().parse().ok()?, received.parse().ok()?))
    });
    let (sent, received) = summary.unwrap_or((requested, 0));

    (sent, received, rtt_samples)
}

/// Send `count` echo requests from `from` to `to`.
///
/// `ping` exiting non-zero on loss is not an error; the loss shows in the
/// report.
///
/// # Errors
///
/// Returns [`VnfError::HostNotFound`] if `from` is not live, or an error if
/// the command cannot be run.
pub async fn probe<B: NetworkBackend>(
    net: &EmulatedNetwork<B>,
    from: &str,
    to: Ipv4Addr,
    count: u32,
) -> VnfResult<ProbeReport> {
    tracing::info!(from, %to, count, "Probing connectivity");

    let out = net
        .run_command(from, &format!("ping -c {count} -W 1 {to}"))
        .await?;
    let transcript = format!("{}{}", out.stdout, out.stderr);
    let (sent, received, rtt_samples) = parse_transcript(&transcript, count);

    let report = ProbeReport {
        from: from.to_string(),
        to: to.to_string(),
        sent,
        received,
        rtt_samples,
        transcript,
    };

    if report.is_success() {
        tracing::info!(
            from,
            %to,
            received = report.received,
            sent = report.sent,
            mean_rtt = ?report.mean_rtt(),
            "Probe succeeded"
        );
    } else {
        tracing::warn!(from, %to, sent = report.sent, "Probe received no replies");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTHY: &str = "\
PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.
64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=10.4 ms
64 bytes from 10.0.0.1: icmp_seq=2 ttl=64 time=10.2 ms
64 bytes from 10.0.0.1: icmp_seq=3 ttl=64 time=10.3 ms

--- 10.0.0.1 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 10.2/10.3/10.4/0.1 ms
";

    const LOST: &str = "\
PING 10.0.0.9 (10.0.0.9) 56(84) bytes of data.

--- 10.0.0.9 ping statistics ---
5 packets transmitted, 0 received, 100% packet loss, time 4090ms
";

    #[test]
    fn parses_healthy_transcript() {
        let (sent, received, samples) = parse_transcript(HEALTHY, 3);
        assert_eq!((sent, received), (3, 3));
        assert_eq!(samples, vec![10.4, 10.2, 10.3]);
    }

    #[test]
    fn parses_total_loss() {
        let (sent, received, samples) = parse_transcript(LOST, 5);
        assert_eq!((sent, received), (5, 0));
        assert!(samples.is_empty());
    }

    #[test]
    fn busybox_summary_line() {
        let out = "4 packets transmitted, 2 packets received, 50% packet loss";
        assert_eq!(parse_transcript(out, 4).0, 4);
        assert_eq!(parse_transcript(out, 4).1, 2);
    }

    #[test]
    fn garbage_counts_as_loss() {
        assert_eq!(parse_transcript("connect: Network is unreachable", 5), (5, 0, vec![]));
    }

    #[test]
    fn report_statistics() {
        let report = ProbeReport {
            sent: 4,
            received: 3,
            rtt_samples: vec![4.0, 6.0],
            ..Default::default()
        };
        assert!(report.is_success());
        assert!((report.loss_percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(report.mean_rtt(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn failed_report_into_error() {
        let report = ProbeReport {
            from: "client".into(),
            to: "10.0.0.1".into(),
            sent: 5,
            received: 0,
            ..Default::default()
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            VnfError::ConnectivityProbeFailed { sent: 5, received: 0, .. }
        ));
    }
}
