//! Lifecycle orchestrator.
//!
//! A run is a fixed sequence of phases over an explicit [`RunContext`]:
//!
//! ```text
//! Building -> NetworkStarting -> NetworkReady -> ProbingConnectivity
//!   -> ContainersCreating -> WorkloadsRunning
//!   -> InteractiveIdle | SkippingInteractive -> TearingDown -> Stopped
//! ```
//!
//! A fatal error skips straight to `TearingDown`, which always runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vnflab_common::{VnfError, VnfResult};
use vnflab_net::{Controller, EmulatedNetwork, NetworkBackend, ProbeReport, probe};
use vnflab_vnf::{
    ContainerHandle, ContainerManager, ContainerRequest, RemoveOutcome, WorkloadSummary,
    WorkloadUnit, run_all,
};

use crate::console::OperatorSession;
use crate::scenario::Scenario;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the topology graph.
    Building,
    /// Realizing the network.
    NetworkStarting,
    /// Network is up.
    NetworkReady,
    /// Running the connectivity probe.
    ProbingConnectivity,
    /// Placing containers on hosts.
    ContainersCreating,
    /// Running workloads to completion.
    WorkloadsRunning,
    /// Operator session in progress.
    InteractiveIdle,
    /// Autotest mode; no operator session.
    SkippingInteractive,
    /// Removing containers and stopping the network.
    TearingDown,
    /// Done.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Building => "Building",
            Self::NetworkStarting => "NetworkStarting",
            Self::NetworkReady => "NetworkReady",
            Self::ProbingConnectivity => "ProbingConnectivity",
            Self::ContainersCreating => "ContainersCreating",
            Self::WorkloadsRunning => "WorkloadsRunning",
            Self::InteractiveIdle => "InteractiveIdle",
            Self::SkippingInteractive => "SkippingInteractive",
            Self::TearingDown => "TearingDown",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// What to do when the connectivity probe gets no replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbePolicy {
    /// Log and continue.
    #[default]
    Soft,
    /// Abort the run.
    Fatal,
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip the operator session.
    pub autotest: bool,
    /// Probe failure handling.
    pub probe_policy: ProbePolicy,
    /// Per-workload bound.
    pub workload_timeout: Option<Duration>,
    /// Absolute capture directory mounted into every VNF.
    pub captures: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            autotest: false,
            probe_policy: ProbePolicy::Soft,
            workload_timeout: None,
            captures: PathBuf::from(vnflab_common::paths::CAPTURE_DIR_NAME),
        }
    }
}

/// Live handles threaded through the phases.
pub struct RunContext<B, M: ?Sized> {
    /// The emulated network.
    pub net: EmulatedNetwork<B>,
    /// The container manager.
    pub manager: Arc<M>,
    /// Containers created so far.
    pub containers: Vec<ContainerHandle>,
}

impl<B: NetworkBackend, M: ContainerManager + ?Sized + 'static> RunContext<B, M> {
    /// Context over an idle network.
    pub fn new(net: EmulatedNetwork<B>, manager: Arc<M>) -> Self {
        Self {
            net,
            manager,
            containers: Vec::new(),
        }
    }
}

/// Outcome of a run, fixed before teardown.
#[derive(Debug, Default)]
pub struct RunReport {
    /// The error that aborted the run, wrapped with its phase.
    pub fatal: Option<VnfError>,
    /// Connectivity probe result, if the probe ran.
    pub probe: Option<ProbeReport>,
    /// Workload results.
    pub workloads: WorkloadSummary,
    /// Every phase entered, in order.
    pub history: Vec<Phase>,
}

impl RunReport {
    /// True when nothing fatal happened. Soft failures do not count.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }

    /// Phase the run failed in, if any.
    #[must_use]
    pub fn failed_phase(&self) -> Option<&str> {
        self.fatal.as_ref().and_then(VnfError::phase)
    }
}

/// Drives one scenario through the lifecycle.
pub struct Orchestrator {
    scenario: Scenario,
    options: RunOptions,
    history: Vec<Phase>,
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(scenario: Scenario, options: RunOptions) -> Self {
        Self {
            scenario,
            options,
            history: Vec::new(),
        }
    }

    /// Phases entered by the current or most recent run.
    #[must_use]
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    fn enter(&mut self, phase: Phase) {
        tracing::info!(phase = %phase, "Entering phase");
        self.history.push(phase);
    }

    /// Run the scenario to completion and tear everything down.
    ///
    /// Each call starts a fresh phase history.
    pub async fn run<B, M, S>(
        &mut self,
        ctx: &mut RunContext<B, M>,
        session: &S,
    ) -> RunReport
    where
        B: NetworkBackend,
        M: ContainerManager + ?Sized + 'static,
        S: OperatorSession<B> + ?Sized,
    {
        self.history.clear();
        let mut report = RunReport::default();

        if let Err((phase, err)) = self.setup(ctx, &mut report, session).await {
            let err = err.in_phase(phase);
            tracing::error!(phase = %phase, error = %err, "Run aborted");
            report.fatal = Some(err);
        }

        self.enter(Phase::TearingDown);
        Self::teardown(ctx).await;
        self.enter(Phase::Stopped);

        report.history = self.history.clone();
        report
    }

    async fn setup<B, M, S>(
        &mut self,
        ctx: &mut RunContext<B, M>,
        report: &mut RunReport,
        session: &S,
    ) -> Result<(), (Phase, VnfError)>
    where
        B: NetworkBackend,
        M: ContainerManager + ?Sized + 'static,
        S: OperatorSession<B> + ?Sized,
    {
        self.enter(Phase::Building);
        let topology = self
            .scenario
            .topology()
            .and_then(|t| t.validate().map(|()| t))
            .map_err(|e| (Phase::Building, e))?;

        self.enter(Phase::NetworkStarting);
        ctx.net.add_controller(Controller::default());
        ctx.net
            .start(topology)
            .await
            .map_err(|e| (Phase::NetworkStarting, e))?;

        self.enter(Phase::NetworkReady);

        self.enter(Phase::ProbingConnectivity);
        report.probe = self
            .check_connectivity(ctx)
            .await
            .map_err(|e| (Phase::ProbingConnectivity, e))?;

        self.enter(Phase::ContainersCreating);
        self.create_containers(ctx)
            .await
            .map_err(|e| (Phase::ContainersCreating, e))?;

        self.enter(Phase::WorkloadsRunning);
        let units = ctx
            .containers
            .iter()
            .cloned()
            .map(WorkloadUnit::entry)
            .collect();
        let runs = run_all(Arc::clone(&ctx.manager), units, self.options.workload_timeout).await;
        report.workloads = WorkloadSummary::new(runs);
        if !report.workloads.all_succeeded() {
            tracing::warn!(
                failed = report.workloads.failures().count(),
                "Some workloads did not succeed"
            );
        }

        if self.options.autotest {
            self.enter(Phase::SkippingInteractive);
        } else {
            self.enter(Phase::InteractiveIdle);
            if let Err(e) = session.run(&ctx.net).await {
                tracing::warn!(error = %e, "Operator session failed");
            }
        }

        Ok(())
    }

    async fn check_connectivity<B: NetworkBackend, M: ?Sized>(
        &self,
        ctx: &RunContext<B, M>,
    ) -> VnfResult<Option<ProbeReport>> {
        let Some(spec) = &self.scenario.probe else {
            tracing::info!("No connectivity probe configured");
            return Ok(None);
        };

        let strict = self.options.probe_policy == ProbePolicy::Fatal;
        let report = match probe(&ctx.net, &spec.from, spec.to, spec.count).await {
            Ok(report) => report,
            Err(e) if strict => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Connectivity probe could not run, continuing");
                return Ok(None);
            }
        };

        if report.is_success() {
            Ok(Some(report))
        } else if strict {
            report.into_result().map(Some)
        } else {
            tracing::warn!(from = %spec.from, to = %spec.to, "Connectivity probe failed, continuing");
            Ok(Some(report))
        }
    }

    async fn create_containers<B, M>(&self, ctx: &mut RunContext<B, M>) -> VnfResult<()>
    where
        B: NetworkBackend,
        M: ContainerManager + ?Sized + 'static,
    {
        for vnf in &self.scenario.vnfs {
            let request = ContainerRequest {
                name: vnf.name.clone(),
                host: vnf.host.clone(),
                attachment: ctx.net.attachment(&vnf.host)?,
                image: vnf.image.clone(),
                entry: vnf.entry.clone(),
                mounts: vnf.resolved_mounts(&self.scenario.base_path, &self.options.captures),
            };
            let handle = ctx.manager.create(request).await?;
            ctx.net.topology_mut().bind_container(&vnf.host, &vnf.name)?;
            tracing::info!(container = %handle, image = %handle.image, "Container ready");
            ctx.containers.push(handle);
        }
        Ok(())
    }

    async fn teardown<B, M>(ctx: &mut RunContext<B, M>)
    where
        B: NetworkBackend,
        M: ContainerManager + ?Sized + 'static,
    {
        for handle in ctx.containers.drain(..).rev() {
            match ctx.manager.remove(&handle).await {
                Ok(RemoveOutcome::Removed) => {
                    tracing::info!(container = %handle.name, "Container removed");
                }
                Ok(RemoveOutcome::AlreadyGone) => {}
                Err(e) => {
                    tracing::warn!(container = %handle.name, error = %e, "Failed to remove container");
                }
            }
            ctx.net.topology_mut().unbind_container(&handle.host, &handle.name);
        }
        ctx.net.stop().await;
    }
}
