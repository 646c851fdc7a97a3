// Plan Execution
//
// Applies a plan step by step through the command runner. Every step,
// and the recommended fix, passes the same gate:
//
//   Proposed -> Empty             (no command tokens)
//   Proposed -> Denied            (policy refused it)
//   Proposed -> AwaitingApproval  (eligible write, no approval)
//   Proposed -> Cleared -> dispatched
//
// A step's failure never halts the sequence. There is no retry and no
// rollback; each step is dispatched at most once.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::plan::{Plan, Step};
use crate::policy::{is_write_like, PolicyEngine};
use crate::probe::{CommandRunner, DEFAULT_TIMEOUT};

pub const APPROVAL_REQUIRED: &str = "Refusing to execute write action without approval";
pub const NO_OUTPUT: &str = "(no output)";
pub const EMPTY_COMMAND: &str = "Refusing to execute empty command";

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: Step,
    pub ok: bool,
    pub output: String,
}

/// Outcome of a whole plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub steps: Vec<StepResult>,
    pub fix: Option<StepResult>,
}

impl ExecutionResult {
    /// All results in execution order, the fix last.
    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().chain(self.fix.iter())
    }

    pub fn all_ok(&self) -> bool {
        self.iter().all(|r| r.ok)
    }

    pub fn failures(&self) -> usize {
        self.iter().filter(|r| !r.ok).count()
    }
}

/// Where a step stands after gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepGate {
    /// No command tokens, so there is no verb to check.
    Empty,
    Denied(String),
    AwaitingApproval,
    Cleared,
}

impl StepGate {
    /// Gate a step. Policy is checked first; approval only matters for
    /// steps policy already allows.
    pub fn evaluate(policy: &PolicyEngine, step: &Step, approved: bool) -> Self {
        if step.cmd.is_empty() {
            return StepGate::Empty;
        }
        let decision = policy.evaluate(step);
        if !decision.allowed {
            return StepGate::Denied(decision.reason);
        }
        if is_write_like(&step.cmd) && !approved {
            return StepGate::AwaitingApproval;
        }
        StepGate::Cleared
    }
}

/// Sequential executor bound to one run's namespace.
pub struct Executor<'a> {
    runner: &'a dyn CommandRunner,
    policy: &'a PolicyEngine,
    namespace: String,
    timeout: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        policy: &'a PolicyEngine,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            policy,
            namespace: namespace.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute every plan step in order, then the recommended fix.
    pub fn execute(&self, plan: &Plan, approved: bool) -> ExecutionResult {
        let steps: Vec<StepResult> = plan
            .plan
            .iter()
            .map(|step| self.run_step(step, approved))
            .collect();
        let fix = plan
            .recommended_fix
            .as_ref()
            .map(|step| self.run_step(step, approved));

        let result = ExecutionResult { steps, fix };
        info!(
            steps = result.steps.len(),
            fix = result.fix.is_some(),
            failures = result.failures(),
            approved,
            "plan executed"
        );
        result
    }

    /// Gate and, if cleared, dispatch a single step.
    pub fn run_step(&self, step: &Step, approved: bool) -> StepResult {
        let (ok, output) = match StepGate::evaluate(self.policy, step, approved) {
            StepGate::Empty => {
                warn!("refusing step with no command");
                (false, EMPTY_COMMAND.to_string())
            }
            StepGate::Denied(reason) => {
                warn!(cmd = %step.joined(), %reason, "policy denied step");
                (false, format!("Policy denied: {reason}"))
            }
            StepGate::AwaitingApproval => {
                info!(cmd = %step.joined(), "write step held for approval");
                (false, APPROVAL_REQUIRED.to_string())
            }
            StepGate::Cleared => self.dispatch(step),
        };

        StepResult {
            step: step.clone(),
            ok,
            output,
        }
    }

    fn dispatch(&self, step: &Step) -> (bool, String) {
        let namespace = step.namespace.as_deref().unwrap_or(&self.namespace);

        match self.runner.run(&step.cmd, Some(namespace), self.timeout) {
            Ok(out) => {
                let text = out.combined();
                let output = if text.is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    text
                };
                if !out.success() {
                    warn!(cmd = %step.joined(), exit_code = out.exit_code, "step failed");
                }
                (out.success(), output)
            }
            Err(err) => {
                warn!(cmd = %step.joined(), %err, "step did not complete");
                (false, format!("Command did not complete: {err}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::parse_plan;
    use crate::testing::ScriptedRunner;

    const SCENARIO: &str = r#"{
        "plan": [{"cmd": ["get", "pods"], "read_only": true}],
        "recommended_fix": {"cmd": ["delete", "pod", "x"], "read_only": false}
    }"#;

    #[test]
    fn unapproved_fix_is_held_but_reads_run() {
        let runner = ScriptedRunner::new().on(&["get", "pods"], 0, "NAME READY\nx 0/1", "");
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let result = executor.execute(&parse_plan(SCENARIO).unwrap(), false);

        assert!(result.steps[0].ok);
        assert_eq!(result.steps[0].output, "NAME READY\nx 0/1");
        let fix = result.fix.unwrap();
        assert!(!fix.ok);
        assert_eq!(fix.output, APPROVAL_REQUIRED);
        assert_eq!(runner.calls_starting_with("delete"), 0);
    }

    #[test]
    fn approved_fix_is_dispatched() {
        let runner = ScriptedRunner::new().on(&["delete", "pod", "x"], 0, "pod \"x\" deleted\n", "");
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let result = executor.execute(&parse_plan(SCENARIO).unwrap(), true);

        let fix = result.fix.unwrap();
        assert!(fix.ok);
        assert_eq!(fix.output, "pod \"x\" deleted");
        assert_eq!(runner.calls_starting_with("delete"), 1);
    }

    #[test]
    fn namespace_deletion_never_dispatches() {
        let runner = ScriptedRunner::new();
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let result = executor.run_step(&Step::new(["delete", "namespace", "prod"], false), true);

        assert!(!result.ok);
        assert_eq!(result.output, "Policy denied: Refusing namespace deletion");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn denied_steps_are_never_dispatched() {
        let runner = ScriptedRunner::new();
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let plan = Plan {
            plan: vec![
                Step::new(["delete", "pod", "x"], true),
                Step::new(["scale", "deploy/api", "--replicas=0"], true),
            ],
            ..Plan::default()
        };
        for approved in [false, true] {
            let result = executor.execute(&plan, approved);
            assert!(result.steps.iter().all(|r| !r.ok));
            assert!(result.steps[0].output.starts_with("Policy denied: "));
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn failures_do_not_halt_the_sequence() {
        let runner = ScriptedRunner::new()
            .on(&["describe"], 1, "", "Error from server (NotFound)")
            .timeout_on(&["logs"]);
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let plan = Plan {
            plan: vec![
                Step::new(["describe", "pod", "gone"], true),
                Step::new(["logs", "api-0"], true),
                Step::new(["get", "events"], true),
            ],
            ..Plan::default()
        };
        let result = executor.execute(&plan, false);

        assert_eq!(result.steps.len(), 3);
        assert!(!result.steps[0].ok);
        assert_eq!(result.steps[0].output, "Error from server (NotFound)");
        assert!(!result.steps[1].ok);
        assert!(result.steps[1].output.starts_with("Command did not complete:"));
        assert!(result.steps[2].ok);
        assert_eq!(result.steps[2].output, NO_OUTPUT);
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(result.failures(), 2);
    }

    #[test]
    fn fix_alone_runs_through_same_path() {
        let runner = ScriptedRunner::new();
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let plan = Plan {
            recommended_fix: Some(Step::new(["rollout", "restart", "deploy/api"], false)),
            ..Plan::default()
        };
        let result = executor.execute(&plan, true);

        assert!(result.steps.is_empty());
        assert_eq!(result.iter().count(), 1);
        assert!(result.fix.unwrap().ok);
    }

    #[test]
    fn namespace_override_falls_back_to_run_namespace() {
        let runner = ScriptedRunner::new();
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        executor.run_step(&Step::new(["get", "pods"], true).in_namespace("kube-system"), false);
        executor.run_step(&Step::new(["get", "pods"], true), false);

        let calls = runner.calls();
        assert_eq!(calls[0].namespace.as_deref(), Some("kube-system"));
        assert_eq!(calls[1].namespace.as_deref(), Some("demo"));
    }

    #[test]
    fn empty_commands_are_never_dispatched() {
        let runner = ScriptedRunner::new();
        let policy = PolicyEngine::standard();
        let executor = Executor::new(&runner, &policy, "demo");

        let plan = Plan {
            plan: vec![Step::new(Vec::<String>::new(), true)],
            recommended_fix: Some(Step::new(Vec::<String>::new(), false)),
            ..Plan::default()
        };
        for approved in [false, true] {
            let result = executor.execute(&plan, approved);
            assert!(result.iter().all(|r| !r.ok && r.output == EMPTY_COMMAND));
        }

        // an empty fix object from the planner is dropped before execution
        let result = executor.execute(&parse_plan(r#"{"plan": [], "recommended_fix": {}}"#).unwrap(), true);
        assert!(result.fix.is_none());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn gate_is_orthogonal_to_approval() {
        let policy = PolicyEngine::standard();
        let write = Step::new(["patch", "deploy/api"], false);

        assert_eq!(StepGate::evaluate(&policy, &write, false), StepGate::AwaitingApproval);
        assert_eq!(StepGate::evaluate(&policy, &write, true), StepGate::Cleared);
        assert!(matches!(
            StepGate::evaluate(&policy, &Step::new(["patch", "deploy/api"], true), true),
            StepGate::Denied(_)
        ));
    }
}
