// Read-Only Triage
//
// Finds unhealthy pods, classifies each one, and pulls logs for the
// top-ranked pod. Nothing here mutates the cluster, and nothing here
// shares state with plan execution.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::kubectl::parse_pods;
use crate::adapters::kubectl::table::{unhealthy_pods, StatusExtractor};
use crate::classify::{classify, suggest, IssueKind};
use crate::probe::ClusterProbe;

const MISSING: &str = "?";
const NO_PREVIOUS_LOGS: &str = "unable to retrieve container logs";

#[derive(Debug, Clone)]
pub struct TriageOptions {
    pub namespace: String,
    /// Inspect this pod instead of scanning the listing.
    pub pod: Option<String>,
    pub max_pods: usize,
    pub log_tail: u32,
}

/// One classified pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodIssue {
    pub pod: String,
    pub phase: String,
    pub restarts: String,
    pub issue: IssueKind,
    pub suggestion: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopPodLogs {
    pub pod: String,
    pub previous: Option<String>,
    pub current: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageReport {
    pub context: Option<String>,
    pub namespace: String,
    pub pods_table: String,
    /// Every pod selected for triage, before the inspection cap.
    pub unhealthy: Vec<String>,
    /// In collection order; the first entry is the top-ranked pod.
    pub issues: Vec<PodIssue>,
    pub top_logs: Option<TopPodLogs>,
    /// Follow-up commands for the operator; never executed.
    pub dry_run: Vec<String>,
}

impl TriageReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }

    /// Unhealthy pods left out by the inspection cap.
    pub fn not_inspected(&self) -> usize {
        self.unhealthy.len().saturating_sub(self.issues.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("failed to list pods in `{namespace}`: {detail}")]
    ClusterUnreachable { namespace: String, detail: String },
}

/// Build a triage report for one namespace.
pub fn triage(
    probe: &ClusterProbe<'_>,
    extractor: &dyn StatusExtractor,
    options: &TriageOptions,
) -> Result<TriageReport, TriageError> {
    let namespace = options.namespace.as_str();

    let context = probe
        .current_context()
        .ok()
        .filter(|out| out.success())
        .map(|out| out.stdout.trim().to_string());

    let listing = match probe.pods_table(namespace) {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => {
            return Err(TriageError::ClusterUnreachable {
                namespace: namespace.to_string(),
                detail: out.stderr.trim().to_string(),
            })
        }
        Err(err) => {
            return Err(TriageError::ClusterUnreachable {
                namespace: namespace.to_string(),
                detail: err.to_string(),
            })
        }
    };

    let targets = match &options.pod {
        Some(pod) => vec![pod.clone()],
        None => unhealthy_pods(extractor, &listing),
    };

    let mut report = TriageReport {
        context,
        namespace: namespace.to_string(),
        pods_table: listing.trim().to_string(),
        unhealthy: targets.clone(),
        issues: Vec::new(),
        top_logs: None,
        dry_run: Vec::new(),
    };

    if targets.is_empty() {
        info!(namespace, "no failing pods detected");
        return Ok(report);
    }

    let events_text = match probe.events_table(namespace) {
        Ok(out) => out.combined(),
        Err(err) => {
            warn!(%err, "event query failed, classifying without events");
            String::new()
        }
    };

    let meta = pod_meta(probe, namespace);

    for pod in targets.iter().take(options.max_pods) {
        let describe = match probe.describe_pod(namespace, pod) {
            Ok(out) => out.stdout,
            Err(err) => {
                warn!(%pod, %err, "describe failed");
                String::new()
            }
        };
        let issue = classify(&format!("{describe}\n{events_text}"));
        let (phase, restarts) = meta
            .get(pod)
            .cloned()
            .unwrap_or_else(|| (MISSING.to_string(), MISSING.to_string()));
        debug!(%pod, %issue, "classified");

        report.issues.push(PodIssue {
            pod: pod.clone(),
            phase,
            restarts,
            issue,
            suggestion: suggest(issue),
        });
    }

    if let Some(first) = report.issues.first().map(|i| i.pod.clone()) {
        report.top_logs = Some(top_logs(probe, namespace, &first, options.log_tail));
        report.dry_run = vec![
            format!("kubectl -n {namespace} describe pod {first}"),
            format!("kubectl -n {namespace} logs {first} --previous --tail=200"),
            format!("kubectl -n {namespace} get events --sort-by=.lastTimestamp | tail -n 30"),
        ];
    }

    info!(
        namespace,
        unhealthy = report.unhealthy.len(),
        inspected = report.issues.len(),
        "triage complete"
    );
    Ok(report)
}

/// Phase and restart count per pod from the JSON listing.
fn pod_meta(probe: &ClusterProbe<'_>, namespace: &str) -> HashMap<String, (String, String)> {
    let listing = match probe.pods_json(namespace) {
        Ok(out) if out.success() => out.stdout,
        _ => return HashMap::new(),
    };

    match parse_pods(&listing, usize::MAX) {
        Ok(pods) => pods
            .into_iter()
            .map(|p| {
                let phase = p.phase.unwrap_or_else(|| MISSING.to_string());
                (p.name, (phase, p.restart_count.to_string()))
            })
            .collect(),
        Err(err) => {
            warn!(%err, "pod JSON listing unparseable");
            HashMap::new()
        }
    }
}

fn top_logs(probe: &ClusterProbe<'_>, namespace: &str, pod: &str, tail: u32) -> TopPodLogs {
    let previous = probe
        .logs(namespace, pod, tail, true)
        .ok()
        .filter(|out| out.success())
        .map(|out| out.stdout.trim().to_string())
        .filter(|text| !text.is_empty() && !text.contains(NO_PREVIOUS_LOGS));

    let current = probe
        .logs(namespace, pod, tail, false)
        .ok()
        .filter(|out| out.success())
        .map(|out| out.stdout.trim().to_string())
        .filter(|text| !text.is_empty());

    TopPodLogs {
        pod: pod.to_string(),
        previous,
        current,
    }
}
