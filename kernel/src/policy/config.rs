// Policy Configuration
//
// Operator-supplied additions to the built-in deny list.

use serde::{Deserialize, Serialize};

use super::{PolicyRule, RuleOutcome};
use crate::plan::Step;

/// Policy configuration loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Substrings of the joined command that are always refused.
    pub extra_denied_patterns: Vec<String>,
}

/// Denies any step whose joined command contains a configured pattern.
pub struct DeniedPatterns {
    patterns: Vec<String>,
}

impl DeniedPatterns {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.into_iter().filter(|p| !p.trim().is_empty()).collect(),
        }
    }
}

impl PolicyRule for DeniedPatterns {
    fn name(&self) -> &'static str {
        "denied-patterns"
    }

    fn check(&self, step: &Step) -> RuleOutcome {
        let joined = step.joined();
        match self.patterns.iter().find(|p| joined.contains(p.as_str())) {
            Some(pattern) => RuleOutcome::Deny(format!("Refusing denied pattern `{pattern}`")),
            None => RuleOutcome::Pass,
        }
    }
}
