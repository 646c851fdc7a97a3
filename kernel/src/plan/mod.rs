// Remediation Plans
//
// Plans come from an untrusted producer. Nothing here grants trust:
// every step is re-checked by the policy engine before it can run.

pub mod oracle;

use serde::{Deserialize, Deserializer, Serialize};

/// One proposed cluster operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Command tokens; the first token is the verb.
    #[serde(default)]
    pub cmd: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Producer's claim. A missing claim is taken as `true`, which the
    /// policy engine then rejects for any write-like verb.
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

impl Step {
    pub fn new<I, S>(cmd: I, read_only: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            namespace: None,
            read_only,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn verb(&self) -> Option<&str> {
        self.cmd.first().map(String::as_str)
    }

    pub fn joined(&self) -> String {
        self.cmd.join(" ")
    }
}

/// Oracle output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub diagnosis: String,

    #[serde(default)]
    pub plan: Vec<Step>,

    /// A fix with no command tokens is treated as absent.
    #[serde(default, deserialize_with = "non_empty_step")]
    pub recommended_fix: Option<Step>,
}

fn non_empty_step<'de, D>(deserializer: D) -> Result<Option<Step>, D::Error>
where
    D: Deserializer<'de>,
{
    let step = Option::<Step>::deserialize(deserializer)?;
    Ok(step.filter(|s| !s.cmd.is_empty()))
}

/// Errors raised while obtaining a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner returned non-JSON or an unexpected shape: {source}\n{raw}")]
    Format {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("planner request failed: {0}")]
    Http(String),

    #[error("failed to encode incident snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("planner error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read planner prompt `{path}`: {source}")]
    Prompt {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported planner provider `{0}`")]
    UnsupportedProvider(String),
}

/// Parse a raw oracle response into a plan.
///
/// Shape errors are fatal for the run and carry the raw text for debugging.
pub fn parse_plan(raw: &str) -> Result<Plan, PlannerError> {
    serde_json::from_str(raw.trim()).map_err(|source| PlannerError::Format {
        raw: raw.to_string(),
        source,
    })
}
