// Direct Remediation
//
// Operator-invoked fixes outside of a planned run. Each action is an
// ordinary write step: it goes through the same policy and approval
// gate as plan steps, and every applied action leaves an audit record.

use std::thread;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditLocation, AuditLog, AuditStore};
use crate::execute::{Executor, StepResult};
use crate::plan::Step;
use crate::policy::PolicyEngine;
use crate::probe::ClusterProbe;
use crate::verify::verify;

/// Replacement container command used by `PatchCommand`.
pub const RECOVERY_COMMAND: [&str; 3] = ["sh", "-c", "echo recovered && sleep 3600"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    /// Delete a single pod so its controller recreates it.
    DeletePod { pod: String },
    RolloutRestart { deployment: String },
    /// Replace the first container's command with `RECOVERY_COMMAND`.
    PatchCommand { deployment: String },
}

impl RemediationAction {
    pub fn name(&self) -> &'static str {
        match self {
            RemediationAction::DeletePod { .. } => "delete_pod",
            RemediationAction::RolloutRestart { .. } => "rollout_restart",
            RemediationAction::PatchCommand { .. } => "patch_command",
        }
    }

    pub fn target(&self) -> String {
        match self {
            RemediationAction::DeletePod { pod } => pod.clone(),
            RemediationAction::RolloutRestart { deployment } => deployment.clone(),
            RemediationAction::PatchCommand { deployment } => format!("deploy/{deployment}"),
        }
    }

    fn patch_document() -> String {
        json!([{
            "op": "replace",
            "path": "/spec/template/spec/containers/0/command",
            "value": RECOVERY_COMMAND,
        }])
        .to_string()
    }

    /// The write step this action performs.
    pub fn step(&self) -> Step {
        let cmd: Vec<String> = match self {
            RemediationAction::DeletePod { pod } => {
                vec!["delete".into(), "pod".into(), pod.clone()]
            }
            RemediationAction::RolloutRestart { deployment } => {
                vec!["rollout".into(), "restart".into(), format!("deploy/{deployment}")]
            }
            RemediationAction::PatchCommand { deployment } => vec![
                "patch".into(),
                format!("deploy/{deployment}"),
                "--type=json".into(),
                "-p".into(),
                Self::patch_document(),
            ],
        };
        Step::new(cmd, false)
    }

    /// Human-readable command shown instead of executing.
    pub fn would_run(&self, namespace: &str) -> String {
        let step = self.step();
        match self {
            RemediationAction::PatchCommand { .. } => format!(
                "kubectl -n {namespace} {} '{}'",
                step.cmd[..step.cmd.len() - 1].join(" "),
                Self::patch_document()
            ),
            _ => format!("kubectl -n {namespace} {}", step.joined()),
        }
    }
}

#[derive(Debug)]
pub enum RemediationOutcome {
    /// Approval was not given; nothing ran and nothing was recorded.
    DryRun { would_run: String },
    Applied(AppliedRemediation),
}

#[derive(Debug)]
pub struct AppliedRemediation {
    pub result: StepResult,
    /// Audit persistence is best-effort.
    pub audit: Result<AuditLocation, String>,
    /// Pod listing after the settle delay.
    pub post_action: String,
}

pub struct Remediator<'a> {
    probe: ClusterProbe<'a>,
    policy: &'a PolicyEngine,
    settle: Duration,
}

impl<'a> Remediator<'a> {
    pub fn new(probe: ClusterProbe<'a>, policy: &'a PolicyEngine, settle: Duration) -> Self {
        Self {
            probe,
            policy,
            settle,
        }
    }

    pub fn apply<S: AuditStore>(
        &self,
        namespace: &str,
        action: &RemediationAction,
        approved: bool,
        audit: &mut AuditLog<S>,
    ) -> RemediationOutcome {
        if !approved {
            info!(action = action.name(), "remediation requires approval, dry run only");
            return RemediationOutcome::DryRun {
                would_run: action.would_run(namespace),
            };
        }

        let executor = Executor::new(self.probe.runner(), self.policy, namespace)
            .with_timeout(self.probe.timeout());
        let result = executor.run_step(&action.step(), approved);

        let audit = audit
            .record_remediation(namespace, action.name(), &action.target(), result.ok, &result.output)
            .map_err(|err| {
                warn!(%err, "failed to write remediation audit record");
                err.to_string()
            });

        if let RemediationAction::PatchCommand { deployment } = action {
            if result.ok {
                match self.probe.rollout_status(namespace, deployment) {
                    Ok(out) if out.success() => info!(%deployment, "rollout complete"),
                    Ok(out) => warn!(%deployment, status = %out.combined(), "rollout not complete"),
                    Err(err) => warn!(%deployment, %err, "rollout status unavailable"),
                }
            }
        }

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        RemediationOutcome::Applied(AppliedRemediation {
            result,
            audit,
            post_action: verify(&self.probe, namespace),
        })
    }
}
