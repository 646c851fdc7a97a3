// Test doubles shared by the kernel's unit tests.

use std::sync::Mutex;
use std::time::Duration;

use crate::incident::snapshot::IncidentSnapshot;
use crate::plan::oracle::PlanOracle;
use crate::plan::{parse_plan, Plan, PlannerError};
use crate::probe::{CommandOutput, CommandRunner, ProbeError};

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub args: Vec<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Output(CommandOutput),
    Timeout,
}

/// Runner answering by argument prefix; unmatched commands exit 0 with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(Vec<String>, Scripted)>,
    calls: Mutex<Vec<Dispatch>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: &[&str], exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.push((
            prefix.iter().map(|s| (*s).to_string()).collect(),
            Scripted::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    pub fn timeout_on(mut self, prefix: &[&str]) -> Self {
        self.rules.push((
            prefix.iter().map(|s| (*s).to_string()).collect(),
            Scripted::Timeout,
        ));
        self
    }

    pub fn calls(&self) -> Vec<Dispatch> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(verb))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        args: &[String],
        namespace: Option<&str>,
        timeout: Duration,
    ) -> Result<CommandOutput, ProbeError> {
        self.calls.lock().unwrap().push(Dispatch {
            args: args.to_vec(),
            namespace: namespace.map(str::to_string),
        });

        let matched = self
            .rules
            .iter()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, response)| response.clone());

        match matched {
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Timeout) => Err(ProbeError::Timeout {
                command: args.join(" "),
                timeout,
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}

/// Oracle returning a canned response body.
pub struct CannedOracle {
    pub response: String,
    pub seen: Mutex<Vec<IncidentSnapshot>>,
}

impl CannedOracle {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl PlanOracle for CannedOracle {
    fn propose(&self, snapshot: &IncidentSnapshot) -> Result<Plan, PlannerError> {
        self.seen.lock().unwrap().push(snapshot.clone());
        parse_plan(&self.response)
    }
}
