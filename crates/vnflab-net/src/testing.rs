//! In-memory substrate for tests.
//!
//! Records every create and destroy, can be told to fail or stall, and
//! answers `ping` the way a fully connected network would.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use vnflab_common::{CommandOutput, NodeId, VnfError, VnfResult};

use crate::backend::{Entity, LinkPlan, NetworkBackend};
use crate::controller::Controller;
use crate::shaping::LinkShaping;
use crate::topology::{Host, Switch};

#[derive(Debug, Default)]
struct State {
    live: Vec<String>,
    events: Vec<String>,
    created: usize,
    destroyed: usize,
    unreachable: HashSet<Ipv4Addr>,
}

/// Backend that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    fail_after: Option<usize>,
    create_delay: Option<Duration>,
    exec_delay: Option<Duration>,
    addresses: DashMap<Ipv4Addr, NodeId>,
    scripted: DashMap<(String, String), CommandOutput>,
}

impl InMemoryBackend {
    /// A backend where everything succeeds instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the creation that follows `n` successful ones.
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep this long inside every creation.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Sleep this long inside every command.
    #[must_use]
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Answer `command` on `host` with `output`.
    pub fn script(&self, host: &str, command: &str, output: CommandOutput) {
        self.scripted
            .insert((host.to_string(), command.to_string()), output);
    }

    /// Drop every echo request sent to `ip`.
    pub fn drop_icmp_to(&self, ip: Ipv4Addr) {
        self.state.lock().unreachable.insert(ip);
    }

    /// Entities currently alive.
    pub fn live(&self) -> Vec<String> {
        self.state.lock().live.clone()
    }

    /// Every create, shape and destroy, in order.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    /// Successful creations so far.
    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    /// Destructions of live entities so far.
    pub fn destroyed(&self) -> usize {
        self.state.lock().destroyed
    }

    async fn record_create(&self, label: String) -> VnfResult<()> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if self.fail_after.is_some_and(|n| state.created >= n) {
            state.events.push(format!("fail {label}"));
            return Err(VnfError::CommandFailed {
                command: format!("create {label}"),
                stderr: "injected failure".to_string(),
            });
        }
        state.created += 1;
        state.events.push(format!("create {label}"));
        state.live.push(label);
        Ok(())
    }

    fn record_destroy(&self, label: String) {
        let mut state = self.state.lock();
        if let Some(pos) = state.live.iter().position(|l| *l == label) {
            state.live.remove(pos);
            state.destroyed += 1;
        }
        state.events.push(format!("destroy {label}"));
    }

    fn simulate_ping(&self, command: &str) -> Option<CommandOutput> {
        let mut words = command.split_whitespace();
        if words.next() != Some("ping") {
            return None;
        }
        let words: Vec<&str> = words.collect();
        let count = words
            .windows(2)
            .find(|w| w[0] == "-c")
            .and_then(|w| w[1].parse::<u32>().ok())
            .unwrap_or(1);
        let target: Ipv4Addr = words.last()?.parse().ok()?;

        let reachable =
            self.addresses.contains_key(&target) && !self.state.lock().unreachable.contains(&target);
        let received = if reachable { count } else { 0 };

        let mut stdout = format!("PING {target} ({target}) 56(84) bytes of data.\n");
        for seq in 1..=received {
            stdout.push_str(&format!(
                "64 bytes from {target}: icmp_seq={seq} ttl=64 time=0.1 ms\n"
            ));
        }
        stdout.push_str(&format!(
            "\n--- {target} ping statistics ---\n{count} packets transmitted, {received} received\n"
        ));

        Some(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: if received > 0 { 0 } else { 1 },
        })
    }
}

fn label(entity: &Entity) -> String {
    entity.to_string()
}

#[async_trait]
impl NetworkBackend for InMemoryBackend {
    async fn create_controller(&self, controller: &Controller) -> VnfResult<()> {
        self.record_create(label(&Entity::Controller(controller.clone())))
            .await
    }

    async fn create_switch(&self, switch: &Switch) -> VnfResult<()> {
        self.record_create(label(&Entity::Switch(switch.clone())))
            .await
    }

    async fn create_host(&self, host: &Host) -> VnfResult<()> {
        self.record_create(label(&Entity::Host(host.clone())))
            .await?;
        self.addresses.insert(host.address.ip, host.id.clone());
        Ok(())
    }

    async fn create_link(&self, link: &LinkPlan) -> VnfResult<()> {
        self.record_create(label(&Entity::Link(link.clone()))).await
    }

    async fn shape_link(&self, link: &LinkPlan, shaping: &LinkShaping) -> VnfResult<()> {
        self.state
            .lock()
            .events
            .push(format!("shape link {} {shaping}", link.index));
        Ok(())
    }

    async fn destroy_link(&self, link: &LinkPlan) -> VnfResult<()> {
        self.record_destroy(label(&Entity::Link(link.clone())));
        Ok(())
    }

    async fn destroy_host(&self, host: &Host) -> VnfResult<()> {
        self.addresses.remove(&host.address.ip);
        self.record_destroy(label(&Entity::Host(host.clone())));
        Ok(())
    }

    async fn destroy_switch(&self, switch: &Switch) -> VnfResult<()> {
        self.record_destroy(label(&Entity::Switch(switch.clone())));
        Ok(())
    }

    async fn destroy_controller(&self, controller: &Controller) -> VnfResult<()> {
        self.record_destroy(label(&Entity::Controller(controller.clone())));
        Ok(())
    }

    async fn exec(&self, host: &NodeId, command: &str) -> VnfResult<CommandOutput> {
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        let key = (host.to_string(), command.to_string());
        if let Some(out) = self.scripted.get(&key) {
            return Ok(out.clone());
        }
        Ok(self
            .simulate_ping(command)
            .unwrap_or_else(|| CommandOutput::ok("")))
    }

    fn attachment(&self, host: &NodeId) -> Option<String> {
        let live = self.state.lock();
        let label = format!("host {host}");
        live.live.contains(&label).then(|| format!("mem.{host}"))
    }
}
