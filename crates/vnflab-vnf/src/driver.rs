//! Concurrent workload driver.
//!
//! Every unit is spawned before any is awaited, then the tasks are joined
//! in input order. Units never cancel one another: a failure, timeout or
//! panic in one unit is only recorded in that unit's [`WorkloadRun`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::manager::{ContainerHandle, ContainerManager};

/// One workload: a command to run to completion in a container.
#[derive(Debug, Clone)]
pub struct WorkloadUnit {
    /// Target container.
    pub container: ContainerHandle,
    /// Shell command line.
    pub command: String,
}

impl WorkloadUnit {
    /// Pair a container with an explicit command.
    #[must_use]
    pub fn new(container: ContainerHandle, command: impl Into<String>) -> Self {
        Self {
            container,
            command: command.into(),
        }
    }

    /// The container's own entry command.
    #[must_use]
    pub fn entry(container: ContainerHandle) -> Self {
        let command = container.entry.clone();
        Self { container, command }
    }
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadOutcome {
    /// Still in flight.
    Running,
    /// Exited with status zero.
    Succeeded,
    /// Exited with a non-zero status.
    Failed(i32),
    /// Did not finish within the unit timeout.
    TimedOut,
    /// Could not be run, or its task panicked.
    Error(String),
}

impl WorkloadOutcome {
    fn from_exit(code: i32) -> Self {
        if code == 0 {
            Self::Succeeded
        } else {
            Self::Failed(code)
        }
    }
}

impl fmt::Display for WorkloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(code) => write!(f, "failed (exit {code})"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Record of one unit's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRun {
    /// Container name.
    pub container: String,
    /// Host the container is placed on.
    pub host: String,
    /// Command that was run.
    pub command: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Time until the unit ended.
    pub elapsed: Duration,
    /// How it ended.
    pub outcome: WorkloadOutcome,
}

impl WorkloadRun {
    fn started(unit: &WorkloadUnit) -> Self {
        Self {
            container: unit.container.name.clone(),
            host: unit.container.host.clone(),
            command: unit.command.clone(),
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            outcome: WorkloadOutcome::Running,
        }
    }

    /// Whether the unit exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == WorkloadOutcome::Succeeded
    }
}

/// Run every unit concurrently and wait for all of them.
///
/// Results are in input order. With `timeout`, a unit still running when it
/// expires is recorded as [`WorkloadOutcome::TimedOut`]; the others keep
/// going.
pub async fn run_all<M>(
    manager: Arc<M>,
    units: Vec<WorkloadUnit>,
    timeout: Option<Duration>,
) -> Vec<WorkloadRun>
where
    M: ContainerManager + ?Sized + 'static,
{
    tracing::info!(units = units.len(), ?timeout, "Starting workloads");

    let tasks: Vec<_> = units
        .into_iter()
        .map(|unit| {
            let manager = Arc::clone(&manager);
            let record = WorkloadRun::started(&unit);
            let handle = tokio::spawn(async move {
                let clock = Instant::now();
                tracing::info!(container = %unit.container, command = %unit.command, "Workload started");

                let exec = manager.exec_blocking(&unit.container, &unit.command);
                let result = match timeout {
                    Some(limit) => tokio::time::timeout(limit, exec).await.ok(),
                    None => Some(exec.await),
                };
                (clock.elapsed(), result)
            });
            (record, handle)
        })
        .collect();

    let mut runs = Vec::with_capacity(tasks.len());
    for (mut record, handle) in tasks {
        match handle.await {
            Ok((elapsed, result)) => {
                record.elapsed = elapsed;
                record.outcome = match result {
                    Some(Ok(code)) => WorkloadOutcome::from_exit(code),
                    Some(Err(e)) => WorkloadOutcome::Error(e.to_string()),
                    None => WorkloadOutcome::TimedOut,
                };
            }
            Err(e) => record.outcome = WorkloadOutcome::Error(format!("task failed: {e}")),
        }

        match &record.outcome {
            WorkloadOutcome::Succeeded => {
                tracing::info!(container = %record.container, elapsed = ?record.elapsed, "Workload finished");
            }
            outcome => {
                tracing::warn!(container = %record.container, %outcome, "Workload did not succeed");
            }
        }
        runs.push(record);
    }

    runs
}

/// Aggregate view over a set of runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    /// Runs in input order.
    pub runs: Vec<WorkloadRun>,
}

impl WorkloadSummary {
    /// Wrap a set of runs.
    #[must_use]
    pub fn new(runs: Vec<WorkloadRun>) -> Self {
        Self { runs }
    }

    /// True when every unit exited with status zero.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(WorkloadRun::succeeded)
    }

    /// Units that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &WorkloadRun> {
        self.runs.iter().filter(|r| !r.succeeded())
    }

    /// Longest single unit.
    #[must_use]
    pub fn longest(&self) -> Option<Duration> {
        self.runs.iter().map(|r| r.elapsed).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(outcome: WorkloadOutcome) -> WorkloadRun {
        WorkloadRun {
            container: "c".into(),
            host: "h".into(),
            command: "true".into(),
            started_at: Utc::now(),
            elapsed: Duration::from_secs(1),
            outcome,
        }
    }

    #[test]
    fn summary_of_mixed_runs() {
        let summary = WorkloadSummary::new(vec![
            run(WorkloadOutcome::Succeeded),
            run(WorkloadOutcome::Failed(2)),
            run(WorkloadOutcome::TimedOut),
        ]);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.failures().count(), 2);
        assert_eq!(summary.longest(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn empty_summary_succeeds() {
        assert!(WorkloadSummary::default().all_succeeded());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(WorkloadOutcome::Failed(3).to_string(), "failed (exit 3)");
        assert_eq!(WorkloadOutcome::from_exit(0), WorkloadOutcome::Succeeded);
    }
}
