// Audit Log
//
// Immutable records of what was observed, proposed, and done. A run
// record is written exactly once per run, after execution and before
// verification, whether or not the steps succeeded.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::execute::ExecutionResult;
use crate::incident::Incident;
use crate::plan::Plan;
pub use store::{AuditLocation, AuditStore, FsAuditStore, InMemoryAuditStore};

/// Record of one incident run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub incident: Incident,
    pub plan: Plan,
    pub results: ExecutionResult,
    pub approved: bool,
}

/// Record of one direct remediation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub action: String,
    pub target: String,
    pub ok: bool,
    pub details: String,
}

/// Anything the audit log stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    Run(AuditRecord),
    Remediation(RemediationRecord),
}

impl AuditEntry {
    pub fn id(&self) -> Uuid {
        match self {
            AuditEntry::Run(r) => r.id,
            AuditEntry::Remediation(r) => r.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::Run(r) => r.timestamp,
            AuditEntry::Remediation(r) => r.timestamp,
        }
    }

    /// Prefix used when naming the stored document.
    pub fn prefix(&self) -> &'static str {
        match self {
            AuditEntry::Run(_) => "run",
            AuditEntry::Remediation(_) => "remediate",
        }
    }

    /// Unique, sortable document name.
    ///
    /// The UUID keeps two records written within the same second apart.
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.prefix(),
            self.timestamp().format("%Y%m%d-%H%M%S"),
            self.id().simple()
        )
    }
}

/// Errors raised by audit storage.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit I/O error at `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("audit record `{0}` already exists")]
    AlreadyExists(String),

    #[error("audit record `{0}` not found")]
    NotFound(String),

    #[error("audit serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only audit log over a pluggable store.
#[derive(Debug)]
pub struct AuditLog<S: AuditStore> {
    store: S,
}

impl<S: AuditStore> AuditLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a finished run.
    pub fn record_run(
        &mut self,
        incident: &Incident,
        plan: &Plan,
        results: &ExecutionResult,
        approved: bool,
    ) -> Result<AuditLocation, AuditError> {
        let entry = AuditEntry::Run(AuditRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            incident: incident.clone(),
            plan: plan.clone(),
            results: results.clone(),
            approved,
        });
        self.append(&entry)
    }

    /// Record a direct remediation command.
    pub fn record_remediation(
        &mut self,
        namespace: &str,
        action: &str,
        target: &str,
        ok: bool,
        details: &str,
    ) -> Result<AuditLocation, AuditError> {
        let entry = AuditEntry::Remediation(RemediationRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            namespace: namespace.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            ok,
            details: details.to_string(),
        });
        self.append(&entry)
    }

    pub fn append(&mut self, entry: &AuditEntry) -> Result<AuditLocation, AuditError> {
        let location = self.store.append(entry)?;
        info!(%location, kind = entry.prefix(), "audit record written");
        Ok(location)
    }

    pub fn load(&self, location: &AuditLocation) -> Result<AuditEntry, AuditError> {
        self.store.load(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::StepResult;
    use crate::incident::{Event, PodLogs, PodSummary};
    use crate::plan::Step;
    use std::collections::BTreeMap;

    pub(crate) fn sample_incident() -> Incident {
        let mut logs = BTreeMap::new();
        logs.insert(
            "api-0".to_string(),
            PodLogs {
                current: Some("starting\npanic: bad config".into()),
                previous: None,
            },
        );
        Incident {
            context: "kind-dev".into(),
            namespace: "demo".into(),
            pods: vec![PodSummary {
                name: "api-0".into(),
                phase: Some("Running".into()),
                node: Some("worker-1".into()),
                restart_count: 7,
                reason: Some("CrashLoopBackOff".into()),
                message: None,
                conditions: vec![serde_json::json!({"type": "Ready", "status": "False"})],
                container_statuses: vec![serde_json::json!({"name": "api", "restartCount": 7})],
            }],
            events: vec![Event {
                reason: "BackOff".into(),
                event_type: "Warning".into(),
                message: "Back-off restarting failed container".into(),
            }],
            logs,
        }
    }

    pub(crate) fn sample_results() -> (Plan, ExecutionResult) {
        let read = Step::new(["get", "pods"], true);
        let fix = Step::new(["delete", "pod", "api-0"], false);
        let plan = Plan {
            summary: "api crash looping".into(),
            diagnosis: "bad config".into(),
            plan: vec![read.clone()],
            recommended_fix: Some(fix.clone()),
        };
        let results = ExecutionResult {
            steps: vec![StepResult {
                step: read,
                ok: true,
                output: "(no output)".into(),
            }],
            fix: Some(StepResult {
                step: fix,
                ok: false,
                output: "Refusing to execute write action without approval".into(),
            }),
        };
        (plan, results)
    }

    #[test]
    fn run_record_round_trips() {
        let mut log = AuditLog::new(InMemoryAuditStore::default());
        let incident = sample_incident();
        let (plan, results) = sample_results();

        let location = log.record_run(&incident, &plan, &results, false).unwrap();
        assert!(location.as_str().starts_with("run-"));

        match log.load(&location).unwrap() {
            AuditEntry::Run(record) => {
                assert_eq!(record.incident, incident);
                assert_eq!(record.plan, plan);
                assert_eq!(record.results, results);
                assert!(!record.approved);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn records_never_share_a_name() {
        let mut log = AuditLog::new(InMemoryAuditStore::default());
        let incident = sample_incident();
        let (plan, results) = sample_results();

        let a = log.record_run(&incident, &plan, &results, true).unwrap();
        let b = log.record_run(&incident, &plan, &results, true).unwrap();
        assert_ne!(a, b);
        assert_eq!(log.store().len(), 2);
    }

    #[test]
    fn remediation_record_is_tagged() {
        let mut log = AuditLog::new(InMemoryAuditStore::default());
        let location = log
            .record_remediation("demo", "delete_pod", "api-0", true, "pod deleted")
            .unwrap();

        assert!(location.as_str().starts_with("remediate-"));
        let raw = log.store().raw(&location).unwrap();
        let json: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(json["kind"], "remediation");
        assert_eq!(json["action"], "delete_pod");
    }
}
