// kubectl Read-Only Adapter
//
// Parses `kubectl ... -o json` listings and exposes the normalized
// pod and event views used by incident collection and triage.

pub mod table;

use serde::Deserialize;
use serde_json::Value;

use crate::incident::{Event, PodSummary};

/// Subset of a pod list we care about.
///
/// Conditions and container statuses are kept verbatim; only the
/// fields needed for ranking and planning are lifted out.
#[derive(Debug, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
pub struct PodItem {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PodSpec,

    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodSpec {
    #[serde(rename = "nodeName")]
    pub node_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodStatus {
    pub phase: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Value>,

    #[serde(rename = "containerStatuses", default)]
    pub container_statuses: Vec<Value>,
}

impl PodItem {
    /// Convert a raw pod into the normalized summary.
    pub fn into_summary(self) -> PodSummary {
        let restart_count = self
            .status
            .container_statuses
            .iter()
            .filter_map(|cs| cs.get("restartCount").and_then(Value::as_u64))
            .fold(0u32, |total, n| {
                total.saturating_add(u32::try_from(n).unwrap_or(u32::MAX))
            });

        let (reason, message) = container_signal(&self.status.container_statuses)
            .unwrap_or((self.status.reason.clone(), self.status.message.clone()));

        PodSummary {
            name: self.metadata.name,
            phase: self.status.phase,
            node: self.spec.node_name,
            restart_count,
            reason,
            message,
            conditions: self.status.conditions,
            container_statuses: self.status.container_statuses,
        }
    }
}

/// First waiting/terminated reason found across containers.
fn container_signal(statuses: &[Value]) -> Option<(Option<String>, Option<String>)> {
    const PATHS: [(&str, &str); 3] = [
        ("state", "waiting"),
        ("state", "terminated"),
        ("lastState", "terminated"),
    ];

    for (outer, inner) in PATHS {
        for cs in statuses {
            if let Some(detail) = cs.get(outer).and_then(|s| s.get(inner)) {
                let reason = detail.get("reason").and_then(Value::as_str);
                if reason.is_some() {
                    let message = detail.get("message").and_then(Value::as_str);
                    return Some((reason.map(str::to_string), message.map(str::to_string)));
                }
            }
        }
    }
    None
}

/// Parse a pod list, keeping at most `max_pods` items in listing order.
pub fn parse_pods(json: &str, max_pods: usize) -> Result<Vec<PodSummary>, serde_json::Error> {
    let list: PodList = serde_json::from_str(if json.trim().is_empty() { "{}" } else { json })?;
    Ok(list
        .items
        .into_iter()
        .take(max_pods)
        .map(PodItem::into_summary)
        .collect())
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    reason: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    message: Option<String>,
    #[serde(rename = "lastTimestamp")]
    last_timestamp: Option<String>,
    #[serde(rename = "eventTime")]
    event_time: Option<String>,
}

impl EventItem {
    fn sort_key(&self) -> &str {
        self.last_timestamp
            .as_deref()
            .or(self.event_time.as_deref())
            .unwrap_or("")
    }
}

/// Parse an event list into ascending order and keep the last `window` entries.
///
/// RFC 3339 timestamps in UTC compare correctly as strings. Events with no
/// timestamp sort first; the sort is stable so server order breaks ties.
pub fn parse_events(json: &str, window: usize) -> Result<Vec<Event>, serde_json::Error> {
    let list: EventList = serde_json::from_str(if json.trim().is_empty() { "{}" } else { json })?;
    let mut items = list.items;
    items.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

    let skip = items.len().saturating_sub(window);
    Ok(items
        .into_iter()
        .skip(skip)
        .map(|e| Event {
            reason: e.reason.unwrap_or_default(),
            event_type: e.event_type.unwrap_or_default(),
            message: e.message.unwrap_or_default(),
        })
        .collect())
}
