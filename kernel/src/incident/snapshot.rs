// Incident Snapshot
//
// The compact, truncated view of an incident handed to the plan oracle.
// Logs and raw statuses never leave the process.

use serde::{Deserialize, Serialize};

use super::Incident;

pub const MAX_SNAPSHOT_PODS: usize = 5;
pub const MAX_SNAPSHOT_EVENTS: usize = 10;
pub const MAX_EVENT_MESSAGE_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSnapshot {
    pub context: String,
    pub namespace: String,
    pub pods: Vec<PodDigest>,
    pub events: Vec<EventDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodDigest {
    pub name: String,
    pub phase: Option<String>,
    pub node: Option<String>,
    pub reason: Option<String>,
    pub restart_count: u32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDigest {
    pub reason: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
}

impl IncidentSnapshot {
    pub fn from_incident(incident: &Incident) -> Self {
        let pods = incident
            .pods
            .iter()
            .take(MAX_SNAPSHOT_PODS)
            .map(|p| PodDigest {
                name: p.name.clone(),
                phase: p.phase.clone(),
                node: p.node.clone(),
                reason: p.reason.clone(),
                restart_count: p.restart_count,
                message: p.message.clone(),
            })
            .collect();

        let skip = incident.events.len().saturating_sub(MAX_SNAPSHOT_EVENTS);
        let events = incident
            .events
            .iter()
            .skip(skip)
            .map(|e| EventDigest {
                reason: e.reason.clone(),
                event_type: e.event_type.clone(),
                message: truncate_chars(&e.message, MAX_EVENT_MESSAGE_CHARS),
            })
            .collect();

        Self {
            context: incident.context.clone(),
            namespace: incident.namespace.clone(),
            pods,
            events,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
