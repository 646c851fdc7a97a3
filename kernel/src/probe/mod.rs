// Cluster Probe
//
// Synchronous, timeout-bounded command execution against the cluster CLI.
// Every cluster interaction is an opaque argument list plus an optional
// namespace; the kernel never depends on a typed cluster API.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Default bound for a single cluster call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Raw result of one completed command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Process exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed `stdout` and `stderr` joined by a newline.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// A call that could not complete at all.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability to run one cluster command.
///
/// Implementations must:
/// - block until the command finishes or `timeout` elapses
/// - never run two commands concurrently on behalf of one caller
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        args: &[String],
        namespace: Option<&str>,
        timeout: Duration,
    ) -> Result<CommandOutput, ProbeError>;
}

/// Production runner that shells out to `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    binary: String,
}

impl Default for KubectlRunner {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn argv(args: &[String], namespace: Option<&str>) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            argv.push("-n".to_string());
            argv.push(ns.to_string());
        }
        argv.extend(args.iter().cloned());
        argv
    }
}

impl CommandRunner for KubectlRunner {
    fn run(
        &self,
        args: &[String],
        namespace: Option<&str>,
        timeout: Duration,
    ) -> Result<CommandOutput, ProbeError> {
        let argv = Self::argv(args, namespace);
        let command = format!("{} {}", self.binary, argv.join(" "));
        debug!(%command, "running cluster command");

        let mut child = Command::new(&self.binary)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProbeError::Launch {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes while polling so a chatty child cannot block on a full pipe.
        // Readers are never joined: a descendant holding the pipes open must
        // not stretch the call past its deadline.
        let stdout = spawn_drain(child.stdout.take());
        let stderr = spawn_drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(%command, "cluster command timed out");
                    return Err(ProbeError::Timeout { command, timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(ProbeError::Launch { command, source });
                }
            }
        };

        match (receive(&stdout, deadline), receive(&stderr, deadline)) {
            (Some(stdout), Some(stderr)) => Ok(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            }),
            _ => {
                warn!(%command, "output pipes still open after exit, giving up");
                Err(ProbeError::Timeout { command, timeout })
            }
        }
    }
}

fn spawn_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Pipe contents, or `None` if the pipe is still open at `deadline`.
fn receive(rx: &Receiver<String>, deadline: Instant) -> Option<String> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

/// Turn a static argument list into owned tokens.
pub fn tokens(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}

/// Read-only cluster queries used by triage, collection and verification.
#[derive(Clone, Copy)]
pub struct ClusterProbe<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Duration,
}

impl<'a> ClusterProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn run(&self, args: &[String], namespace: Option<&str>) -> Result<CommandOutput, ProbeError> {
        self.runner.run(args, namespace, self.timeout)
    }

    pub fn current_context(&self) -> Result<CommandOutput, ProbeError> {
        self.run(&tokens(&["config", "current-context"]), None)
    }

    /// Wide tabular pod listing.
    pub fn pods_table(&self, namespace: &str) -> Result<CommandOutput, ProbeError> {
        self.run(&tokens(&["get", "pods", "-o", "wide"]), Some(namespace))
    }

    pub fn pods_json(&self, namespace: &str) -> Result<CommandOutput, ProbeError> {
        self.run(&tokens(&["get", "pods", "-o", "json"]), Some(namespace))
    }

    pub fn events_table(&self, namespace: &str) -> Result<CommandOutput, ProbeError> {
        self.run(
            &tokens(&["get", "events", "--sort-by=.lastTimestamp"]),
            Some(namespace),
        )
    }

    pub fn events_json(&self, namespace: &str) -> Result<CommandOutput, ProbeError> {
        self.run(
            &tokens(&["get", "events", "--sort-by=.lastTimestamp", "-o", "json"]),
            Some(namespace),
        )
    }

    pub fn describe_pod(&self, namespace: &str, pod: &str) -> Result<CommandOutput, ProbeError> {
        self.run(&tokens(&["describe", "pod", pod]), Some(namespace))
    }

    pub fn logs(
        &self,
        namespace: &str,
        pod: &str,
        tail: u32,
        previous: bool,
    ) -> Result<CommandOutput, ProbeError> {
        let mut args = vec!["logs".to_string(), pod.to_string(), format!("--tail={tail}")];
        if previous {
            args.push("--previous".to_string());
        }
        self.run(&args, Some(namespace))
    }

    pub fn rollout_status(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> Result<CommandOutput, ProbeError> {
        self.run(
            &tokens(&[
                "rollout",
                "status",
                &format!("deploy/{deployment}"),
                "--timeout=60s",
            ]),
            Some(namespace),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn namespace_is_prefixed() {
        let argv = KubectlRunner::argv(&tokens(&["get", "pods"]), Some("demo"));
        assert_eq!(argv, tokens(&["-n", "demo", "get", "pods"]));

        let argv = KubectlRunner::argv(&tokens(&["config", "current-context"]), None);
        assert_eq!(argv, tokens(&["config", "current-context"]));
    }

    #[test]
    fn combined_output_is_trimmed() {
        let out = CommandOutput {
            exit_code: 0,
            stdout: "pod/x deleted\n".into(),
            stderr: String::new(),
        };
        assert_eq!(out.combined(), "pod/x deleted");
        assert!(CommandOutput::default().combined().is_empty());
    }

    #[test]
    fn missing_binary_is_a_launch_failure() {
        let runner = KubectlRunner::new("kubemedic-definitely-not-installed");
        let err = runner
            .run(&tokens(&["version"]), None, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let runner = KubectlRunner::new("sleep");
        let err = runner
            .run(&tokens(&["5"]), None, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(err.to_string().ends_with("timed out after 100ms"));
    }

    #[cfg(unix)]
    #[test]
    fn orphaned_descendants_do_not_extend_the_deadline() {
        let runner = KubectlRunner::new("sh");
        let timeout = Duration::from_millis(200);

        // parent killed at the deadline while its child still holds the pipes
        let started = Instant::now();
        let err = runner
            .run(&tokens(&["-c", "sleep 4 & wait"]), None, timeout)
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        // parent exits at once, background child keeps the pipes open
        let started = Instant::now();
        let err = runner
            .run(&tokens(&["-c", "sleep 4 &"]), None, timeout)
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn fast_command_output_is_captured() {
        let runner = KubectlRunner::new("sh");
        let out = runner
            .run(&tokens(&["-c", "echo ok; echo warn >&2; exit 3"]), None, Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "ok\n");
        assert_eq!(out.stderr, "warn\n");
    }

    #[test]
    fn logs_query_shape() {
        let runner = ScriptedRunner::new();
        let probe = ClusterProbe::new(&runner, DEFAULT_TIMEOUT);
        probe.logs("demo", "api-0", 80, true).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, tokens(&["logs", "api-0", "--tail=80", "--previous"]));
        assert_eq!(calls[0].namespace.as_deref(), Some("demo"));
    }
}
