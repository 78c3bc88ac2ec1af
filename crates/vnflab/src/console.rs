//! Interactive operator session.
//!
//! Entered after the workloads finish when not running in autotest mode.
//! The run only proceeds to teardown once the session returns.

use std::fmt::Write as _;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vnflab_common::VnfResult;
use vnflab_net::{EmulatedNetwork, NetworkBackend, probe};

/// Prompt shown by [`StdinConsole`].
pub const PROMPT: &str = "vnflab> ";

const HELP: &str = "\
Commands:
  help               show this message
  nodes              list hosts and switches
  links              list links and their shaping
  pingall            probe every host from every other host
  <host> <cmd...>    run a shell command on a host
  exit | quit        leave the session and tear down";

/// An interactive session against the live network.
#[async_trait]
pub trait OperatorSession<B: NetworkBackend>: Send + Sync {
    /// Run until the operator is done.
    async fn run(&self, net: &EmulatedNetwork<B>) -> VnfResult<()>;
}

/// What one console line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this and keep reading.
    Output(String),
    /// Leave the session.
    Exit,
}

/// Interpret one console line.
pub async fn dispatch<B: NetworkBackend>(net: &EmulatedNetwork<B>, line: &str) -> Reply {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    match word {
        "" => Reply::Output(String::new()),
        "exit" | "quit" => Reply::Exit,
        "help" => Reply::Output(HELP.to_string()),
        "nodes" => Reply::Output(list_nodes(net)),
        "links" => Reply::Output(list_links(net)),
        "pingall" => Reply::Output(ping_all(net).await),
        host if net.topology().host(host).is_some() => {
            let command = rest.trim();
            if command.is_empty() {
                return Reply::Output(format!("usage: {host} <command>"));
            }
            match net.run_command(host, command).await {
                Ok(out) => {
                    let mut text = out.stdout;
                    if !out.stderr.is_empty() {
                        text.push_str(&out.stderr);
                    }
                    Reply::Output(text.trim_end().to_string())
                }
                Err(e) => Reply::Output(format!("error: {e}")),
            }
        }
        other => Reply::Output(format!("*** Unknown command: {other} (try 'help')")),
    }
}

fn list_nodes<B: NetworkBackend>(net: &EmulatedNetwork<B>) -> String {
    let topo = net.topology();
    let mut out = String::new();
    for host in topo.hosts() {
        let role = host.role.map(|r| format!(" [{r}]")).unwrap_or_default();
        let containers = host.containers.iter().cloned().collect::<Vec<_>>().join(", ");
        let _ = write!(out, "host   {} {}{role}", host.id, host.address);
        if !containers.is_empty() {
            let _ = write!(out, " containers: {containers}");
        }
        out.push('\n');
    }
    for switch in topo.switches() {
        let _ = writeln!(out, "switch {}", switch.id);
    }
    out.trim_end().to_string()
}

fn list_links<B: NetworkBackend>(net: &EmulatedNetwork<B>) -> String {
    net.topology()
        .links()
        .iter()
        .map(|link| {
            let shaping = link
                .shaping
                .map_or_else(|| "unshaped".to_string(), |s| s.to_string());
            format!("{}-{} {shaping}", link.a, link.b)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn ping_all<B: NetworkBackend>(net: &EmulatedNetwork<B>) -> String {
    let hosts = net.topology().hosts();
    let mut out = String::new();
    let (mut sent, mut lost) = (0u32, 0u32);

    for from in hosts {
        let _ = write!(out, "{} ->", from.id);
        for to in hosts.iter().filter(|h| h.id != from.id) {
            sent += 1;
            match probe(net, from.id.as_str(), to.address.ip, 1).await {
                Ok(report) if report.is_success() => {
                    let _ = write!(out, " {}", to.id);
                }
                _ => {
                    lost += 1;
                    out.push_str(" X");
                }
            }
        }
        out.push('\n');
    }

    let dropped = if sent == 0 { 0 } else { lost * 100 / sent };
    let _ = write!(out, "*** Results: {dropped}% dropped ({}/{sent} received)", sent - lost);
    out
}

/// Console reading commands from standard input.
#[derive(Debug, Default)]
pub struct StdinConsole;

impl StdinConsole {
    /// Create a console.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<B: NetworkBackend> OperatorSession<B> for StdinConsole {
    async fn run(&self, net: &EmulatedNetwork<B>) -> VnfResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        loop {
            stdout.write_all(PROMPT.as_bytes()).await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                stdout.write_all(b"\n").await?;
                break;
            };
            match dispatch(net, &line).await {
                Reply::Exit => break,
                Reply::Output(text) if text.is_empty() => {}
                Reply::Output(text) => {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
            }
        }

        tracing::info!("Operator session ended");
        Ok(())
    }
}

/// Session replaying a fixed list of lines, recording the replies.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    lines: Vec<String>,
    transcript: Mutex<Vec<String>>,
    entered: Mutex<usize>,
}

impl ScriptedSession {
    /// Session that will send `lines` in order. Stops early on `exit`.
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Replies received so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().clone()
    }

    /// How many times the session was entered.
    pub fn entered(&self) -> usize {
        *self.entered.lock()
    }
}

#[async_trait]
impl<B: NetworkBackend> OperatorSession<B> for ScriptedSession {
    async fn run(&self, net: &EmulatedNetwork<B>) -> VnfResult<()> {
        *self.entered.lock() += 1;
        for line in &self.lines {
            match dispatch(net, line).await {
                Reply::Exit => break,
                Reply::Output(text) => self.transcript.lock().push(text),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnflab_common::CommandOutput;
    use vnflab_net::testing::InMemoryBackend;
    use vnflab_net::{Controller, Topology};

    async fn running() -> EmulatedNetwork<InMemoryBackend> {
        let backend = InMemoryBackend::new();
        backend.script("server", "hostname", CommandOutput::ok("server\n"));
        let mut net = EmulatedNetwork::new(backend);
        net.add_controller(Controller::default());
        net.start(Topology::streaming_default(10.0, 5.0).unwrap())
            .await
            .unwrap();
        net
    }

    #[tokio::test]
    async fn nodes_and_links() {
        let net = running().await;
        insta::assert_snapshot!(list_nodes(&net), @r"
        host   server 10.0.0.1/8 [server]
        host   client 10.0.0.2/8 [client]
        switch s1
        switch s2
        ");
        insta::assert_snapshot!(list_links(&net), @r"
        s1-server unshaped
        s1-s2 10Mbit/5ms
        s2-client unshaped
        ");
    }

    #[tokio::test]
    async fn host_command_and_unknown_word() {
        let net = running().await;
        assert_eq!(
            dispatch(&net, "server hostname").await,
            Reply::Output("server".to_string())
        );
        assert_eq!(
            dispatch(&net, "server").await,
            Reply::Output("usage: server <command>".to_string())
        );
        let Reply::Output(text) = dispatch(&net, "frobnicate").await else {
            panic!("expected output");
        };
        assert!(text.contains("Unknown command"));
        assert_eq!(dispatch(&net, "  quit ").await, Reply::Exit);
    }

    #[tokio::test]
    async fn pingall_reports_full_mesh() {
        let net = running().await;
        let Reply::Output(text) = dispatch(&net, "pingall").await else {
            panic!("expected output");
        };
        assert!(text.contains("server -> client"));
        assert!(text.contains("client -> server"));
        assert!(text.ends_with("0% dropped (2/2 received)"));
    }

    #[tokio::test]
    async fn scripted_session_stops_at_exit() {
        let net = running().await;
        let session = ScriptedSession::new(["help", "exit", "nodes"]);
        session.run(&net).await.unwrap();
        assert_eq!(session.entered(), 1);
        assert_eq!(session.transcript().len(), 1);
        assert!(session.transcript()[0].starts_with("Commands:"));
    }
}
