// Incident Collection
//
// Gathers a bounded snapshot of a namespace's health through the
// cluster probe. Only the pod listing is essential; every other query
// degrades to partial data.

pub mod snapshot;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::kubectl::{parse_events, parse_pods};
use crate::probe::{ClusterProbe, CommandOutput, ProbeError};

/// Context reported when the active context cannot be read.
pub const UNKNOWN_CONTEXT: &str = "(unknown)";

/// Snapshot of one namespace's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub context: String,
    pub namespace: String,
    /// At most the configured pod cap, in listing order.
    pub pods: Vec<PodSummary>,
    /// Ascending by time, bounded window.
    pub events: Vec<Event>,
    pub logs: BTreeMap<String, PodLogs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub phase: Option<String>,
    pub node: Option<String>,
    pub restart_count: u32,
    /// Most telling waiting/terminated reason, if any.
    pub reason: Option<String>,
    pub message: Option<String>,
    pub conditions: Vec<Value>,
    pub container_statuses: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub reason: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
}

/// Log text per pod. Absence is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodLogs {
    pub current: Option<String>,
    pub previous: Option<String>,
}

/// Bounds applied during collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectOptions {
    pub max_pods: usize,
    pub event_window: usize,
    pub log_tail: u32,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            max_pods: 5,
            event_window: 30,
            log_tail: 80,
        }
    }
}

/// Failures that abort collection.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("cluster unreachable while listing pods in `{namespace}`: {detail}")]
    ClusterUnreachable { namespace: String, detail: String },

    #[error("pod listing for `{namespace}` is not valid JSON: {source}")]
    MalformedListing {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Collect an incident snapshot for `namespace`.
pub fn collect(
    probe: &ClusterProbe<'_>,
    namespace: &str,
    options: CollectOptions,
) -> Result<Incident, CollectError> {
    let context = match succeeded(probe.current_context()) {
        Some(out) => out.stdout.trim().to_string(),
        None => {
            warn!("could not read current context");
            UNKNOWN_CONTEXT.to_string()
        }
    };

    let listing = match probe.pods_json(namespace) {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => {
            return Err(CollectError::ClusterUnreachable {
                namespace: namespace.to_string(),
                detail: out.combined(),
            })
        }
        Err(err) => {
            return Err(CollectError::ClusterUnreachable {
                namespace: namespace.to_string(),
                detail: err.to_string(),
            })
        }
    };

    let pods = parse_pods(&listing, options.max_pods).map_err(|source| {
        CollectError::MalformedListing {
            namespace: namespace.to_string(),
            source,
        }
    })?;

    let events = match succeeded(probe.events_json(namespace)) {
        Some(out) => parse_events(&out.stdout, options.event_window).unwrap_or_else(|err| {
            warn!(%err, "event listing unparseable, continuing without events");
            Vec::new()
        }),
        None => {
            warn!(namespace, "event query failed, continuing without events");
            Vec::new()
        }
    };

    let mut logs = BTreeMap::new();
    for pod in &pods {
        let current = succeeded(probe.logs(namespace, &pod.name, options.log_tail, false))
            .map(|out| out.stdout.trim().to_string());
        let previous = succeeded(probe.logs(namespace, &pod.name, options.log_tail, true))
            .map(|out| out.stdout.trim().to_string());
        debug!(pod = %pod.name, has_current = current.is_some(), has_previous = previous.is_some(), "collected logs");
        logs.insert(pod.name.clone(), PodLogs { current, previous });
    }

    info!(
        namespace,
        pods = pods.len(),
        events = events.len(),
        "incident collected"
    );

    Ok(Incident {
        context,
        namespace: namespace.to_string(),
        pods,
        events,
        logs,
    })
}

/// Successful output, or `None` for any failed or non-zero query.
fn succeeded(result: Result<CommandOutput, ProbeError>) -> Option<CommandOutput> {
    match result {
        Ok(out) if out.success() => Some(out),
        Ok(out) => {
            debug!(exit_code = out.exit_code, stderr = %out.stderr.trim(), "query returned non-zero");
            None
        }
        Err(err) => {
            debug!(%err, "query failed");
            None
        }
    }
}
