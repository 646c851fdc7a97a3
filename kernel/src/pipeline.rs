// End-to-End Incident Run
//
// collect → plan → execute → audit → verify
//
// Only collection and planning can abort a run. Everything after the
// plan is accepted runs to completion; audit persistence is best-effort
// and reported alongside the outcome rather than replacing it.

use tracing::{info, warn};

use crate::audit::{AuditLocation, AuditLog, AuditStore};
use crate::execute::{ExecutionResult, Executor};
use crate::incident::snapshot::IncidentSnapshot;
use crate::incident::{collect, CollectError, CollectOptions, Incident};
use crate::plan::oracle::PlanOracle;
use crate::plan::{Plan, PlannerError};
use crate::policy::PolicyEngine;
use crate::probe::ClusterProbe;
use crate::verify::verify;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub namespace: String,
    pub approved: bool,
    pub collect: CollectOptions,
}

/// Progress callbacks, so partial output survives an aborted run.
pub trait RunObserver {
    fn incident_collected(&mut self, _incident: &Incident) {}
    fn plan_received(&mut self, _plan: &Plan) {}
    fn plan_executed(&mut self, _results: &ExecutionResult) {}
    fn audit_written(&mut self, _audit: &Result<AuditLocation, String>) {}
}

/// Observer that ignores every stage.
pub struct Silent;

impl RunObserver for Silent {}

/// Result of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub incident: Incident,
    pub plan: Plan,
    pub results: ExecutionResult,
    pub audit: Result<AuditLocation, String>,
    pub verification: String,
}

/// Errors that abort a run before anything is executed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Planner(#[from] PlannerError),
}

/// Run one incident end to end.
pub fn run_incident<S: AuditStore>(
    probe: &ClusterProbe<'_>,
    oracle: &dyn PlanOracle,
    policy: &PolicyEngine,
    audit: &mut AuditLog<S>,
    options: &RunOptions,
    observer: &mut dyn RunObserver,
) -> Result<RunReport, RunError> {
    // 1. Observe
    let incident = collect(probe, &options.namespace, options.collect)?;
    observer.incident_collected(&incident);

    // 2. Plan
    let snapshot = IncidentSnapshot::from_incident(&incident);
    let plan = oracle.propose(&snapshot)?;
    info!(
        steps = plan.plan.len(),
        fix = plan.recommended_fix.is_some(),
        "plan received"
    );
    observer.plan_received(&plan);

    // 3. Execute
    let executor = Executor::new(probe.runner(), policy, options.namespace.clone())
        .with_timeout(probe.timeout());
    let results = executor.execute(&plan, options.approved);
    observer.plan_executed(&results);

    // 4. Audit
    let audit = audit
        .record_run(&incident, &plan, &results, options.approved)
        .map_err(|err| {
            warn!(%err, "failed to write audit record");
            err.to_string()
        });
    observer.audit_written(&audit);

    // 5. Verify
    let verification = verify(probe, &options.namespace);

    Ok(RunReport {
        incident,
        plan,
        results,
        audit,
        verification,
    })
}
