//! vnflab CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tabled::{Table, Tabled};
use vnflab_common::{LabPaths, RunPrefix};
use vnflab_net::{EmulatedNetwork, LinuxBackend};
use vnflab_vnf::{DockerManager, WorkloadRun};

use crate::console::StdinConsole;
use crate::orchestrator::{Orchestrator, ProbePolicy, RunContext, RunOptions, RunReport};
use crate::scenario::Scenario;

/// vnflab - Emulated network with containerized network functions
#[derive(Debug, Parser)]
#[command(name = "vnflab")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run unattended: skip the interactive session before teardown
    #[arg(long)]
    pub autotest: bool,

    /// Scenario file (YAML); defaults to the video streaming deployment
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,

    /// Capture directory mounted at /home/pcap/ in every VNF
    #[arg(long, env = "VNFLAB_PCAP_DIR")]
    pub pcap_dir: Option<PathBuf>,

    /// Bandwidth of shaped links, in Mbit/s
    #[arg(long, value_name = "MBIT", allow_negative_numbers = true)]
    pub bandwidth: Option<f64>,

    /// Delay of shaped links, in ms
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub delay: Option<f64>,

    /// Abort the run if the connectivity probe gets no replies
    #[arg(long)]
    pub strict_probe: bool,

    /// Bound on each workload, in seconds
    #[arg(long, value_name = "SECS")]
    pub workload_timeout: Option<u64>,

    /// Bound on network startup, in seconds
    #[arg(long, value_name = "SECS")]
    pub start_timeout: Option<u64>,

    /// Bound on each host command, in seconds
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Tabled)]
struct WorkloadRow {
    #[tabled(rename = "CONTAINER")]
    container: String,
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "STARTED")]
    started: String,
    #[tabled(rename = "ELAPSED")]
    elapsed: String,
    #[tabled(rename = "OUTCOME")]
    outcome: String,
}

impl From<&WorkloadRun> for WorkloadRow {
    fn from(run: &WorkloadRun) -> Self {
        Self {
            container: run.container.clone(),
            host: run.host.clone(),
            started: run.started_at.format("%H:%M:%S").to_string(),
            elapsed: format!("{:.1}s", run.elapsed.as_secs_f64()),
            outcome: run.outcome.to_string(),
        }
    }
}

fn secs(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_secs)
}

impl Cli {
    /// Log filter directive for the chosen verbosity.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.debug { "vnflab=debug" } else { "vnflab=info" }
    }

    /// Scenario with command-line overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario file cannot be loaded.
    pub fn load_scenario(&self) -> Result<Scenario> {
        let scenario = match &self.scenario {
            Some(path) => Scenario::from_file(path)?,
            None => Scenario::default(),
        };
        Ok(scenario.with_shaping_overrides(self.bandwidth, self.delay))
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns an error naming the failed phase if the run aborted.
    pub async fn execute(self) -> Result<()> {
        let scenario = self.load_scenario()?;

        let mut paths = LabPaths::beside_entry_point();
        if let Some(dir) = &self.pcap_dir {
            paths = paths.with_captures(dir);
        }
        let captures = paths.ensure_captures()?;

        let prefix = RunPrefix::generate();
        tracing::info!(prefix = %prefix, captures = %captures.display(), "Starting run");

        let backend = LinuxBackend::with_prefix(prefix.clone()).with_host_image(&scenario.host_image);
        let net = EmulatedNetwork::new(backend)
            .with_start_timeout(secs(self.start_timeout))
            .with_command_timeout(secs(self.command_timeout));
        let mut ctx = RunContext::new(net, Arc::new(DockerManager::new(prefix)));

        let options = RunOptions {
            autotest: self.autotest,
            probe_policy: if self.strict_probe {
                ProbePolicy::Fatal
            } else {
                ProbePolicy::Soft
            },
            workload_timeout: secs(self.workload_timeout),
            captures,
        };

        let mut orchestrator = Orchestrator::new(scenario, options);
        let report = orchestrator.run(&mut ctx, &StdinConsole::new()).await;

        print_report(&report);
        match report.fatal {
            Some(err) => Err(eyre!(err)),
            None => Ok(()),
        }
    }
}

fn print_report(report: &RunReport) {
    if let Some(probe) = &report.probe {
        println!(
            "Probe {} -> {}: {}/{} replies ({:.0}% loss)",
            probe.from,
            probe.to,
            probe.received,
            probe.sent,
            probe.loss_percent()
        );
    }

    let rows: Vec<WorkloadRow> = report.workloads.runs.iter().map(WorkloadRow::from).collect();
    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["vnflab"]);
        assert!(!cli.autotest);
        assert!(!cli.strict_probe);
        assert_eq!(cli.log_directive(), "vnflab=info");
        assert!(cli.workload_timeout.is_none());
    }

    #[test]
    fn overrides_reach_the_scenario() {
        let cli = Cli::parse_from(["vnflab", "--autotest", "--bandwidth", "20", "--debug"]);
        assert!(cli.autotest);
        assert_eq!(cli.log_directive(), "vnflab=debug");
        let scenario = cli.load_scenario().unwrap();
        assert_eq!(scenario.links[1].shaping.bandwidth_mbit, Some(20.0));
        assert_eq!(scenario.links[1].shaping.delay_ms, Some(5.0));
    }
}
