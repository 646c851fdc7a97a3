// Failure Classification
//
// Maps diagnostic text (describe output + recent events) to the most
// likely failure mode. Rules are ordered: the first match wins, so the
// order encodes priority, not severity.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Likely failure mode of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    CrashLoopBackOff,
    ImagePullBackOff,
    OomKilled,
    Unschedulable,
    ProbeFail,
    CreateContainerConfigError,
    /// Generic error marker with no specific signature.
    CrashLikely,
    Unknown,
}

impl IssueKind {
    pub fn label(self) -> &'static str {
        match self {
            IssueKind::CrashLoopBackOff => "CrashLoopBackOff",
            IssueKind::ImagePullBackOff => "ImagePullBackOff",
            IssueKind::OomKilled => "OOMKilled",
            IssueKind::Unschedulable => "Pending/Unschedulable",
            IssueKind::ProbeFail => "ProbeFail",
            IssueKind::CreateContainerConfigError => "CreateContainerConfigError",
            IssueKind::CrashLikely => "Crashed (likely CrashLoop)",
            IssueKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered classification rules.
static RULES: LazyLock<Vec<(IssueKind, Regex)>> = LazyLock::new(|| {
    vec![
        (IssueKind::CrashLoopBackOff, Regex::new(r"(?i)CrashLoopBackOff").unwrap()),
        (IssueKind::ImagePullBackOff, Regex::new(r"(?i)ImagePullBackOff|ErrImagePull").unwrap()),
        (IssueKind::OomKilled, Regex::new(r"(?i)OOMKilled").unwrap()),
        (IssueKind::Unschedulable, Regex::new(r"(?i)Pending|Unschedulable|FailedScheduling").unwrap()),
        (IssueKind::ProbeFail, Regex::new(r"(?i)Readiness probe failed|Liveness probe failed").unwrap()),
        (IssueKind::CreateContainerConfigError, Regex::new(r"(?i)CreateContainerConfigError").unwrap()),
    ]
});

static GENERIC_ERROR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bError\b").unwrap());

/// Classify diagnostic text.
///
/// Pure and total: the same text always yields the same kind.
pub fn classify(text: &str) -> IssueKind {
    RULES
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(kind, _)| *kind)
        .unwrap_or_else(|| {
            if GENERIC_ERROR.is_match(text) {
                IssueKind::CrashLikely
            } else {
                IssueKind::Unknown
            }
        })
}

/// One remediation hint per kind.
pub fn suggest(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::CrashLoopBackOff => {
            "Get logs (--previous), confirm exit code, fix command/config, redeploy."
        }
        IssueKind::CrashLikely => {
            "Pod is crashing fast; check logs/describe; it becomes CrashLoopBackOff soon."
        }
        IssueKind::ImagePullBackOff => {
            "Fix image/tag/registry creds; patch deployment; verify imagePullSecrets."
        }
        IssueKind::OomKilled => "Increase memory; reduce load; check leaks; scale; confirm restarts stop.",
        IssueKind::Unschedulable => {
            "Requests too high/taints; adjust requests/tolerations or add capacity."
        }
        IssueKind::ProbeFail => "Check probe path/port/timeouts; tune probes or fix app startup.",
        IssueKind::CreateContainerConfigError => {
            "Env/secret/config invalid; check describe events; fix refs."
        }
        IssueKind::Unknown => {
            "Inspect describe+events for signal: RBAC, DNS, NetworkPolicy, volumes, probes."
        }
    }
}
