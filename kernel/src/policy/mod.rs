// Policy Engine
//
// Policy rules are pure checks over a single proposed step. They run
// before any execution attempt, including the recommended fix, and are
// independent of the approval flag: policy decides whether a step is
// eligible at all, approval decides whether an eligible write runs.

pub mod config;

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::plan::Step;
use config::{DeniedPatterns, PolicyConfig};

/// Verbs presumed to mutate cluster state.
pub const WRITE_VERBS: [&str; 8] = [
    "apply", "delete", "patch", "create", "edit", "replace", "scale", "rollout",
];

/// Classification of a command derived from its verb alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbClass {
    Write,
    Read,
}

impl VerbClass {
    pub fn of(cmd: &[String]) -> Self {
        match cmd.first() {
            Some(verb) if WRITE_VERBS.contains(&verb.as_str()) => VerbClass::Write,
            _ => VerbClass::Read,
        }
    }
}

/// Whether a command looks like a write, regardless of what the producer claims.
pub fn is_write_like(cmd: &[String]) -> bool {
    VerbClass::of(cmd) == VerbClass::Write
}

/// Policy verdict for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Result of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Pass,
    Deny(String),
}

/// Trait implemented by all policy rules.
///
/// Rules must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait PolicyRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, step: &Step) -> RuleOutcome;
}

/// Write-like verbs may never be declared read-only.
pub struct WriteClassification;

impl PolicyRule for WriteClassification {
    fn name(&self) -> &'static str {
        "write-classification"
    }

    fn check(&self, step: &Step) -> RuleOutcome {
        if is_write_like(&step.cmd) && step.read_only {
            RuleOutcome::Deny("write-like command marked read_only".into())
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Namespace deletion is never permitted.
pub struct NamespaceDeletion;

impl PolicyRule for NamespaceDeletion {
    fn name(&self) -> &'static str {
        "namespace-deletion"
    }

    fn check(&self, step: &Step) -> RuleOutcome {
        let joined = step.joined();
        if joined.contains("delete ns") || joined.contains("delete namespace") {
            RuleOutcome::Deny("Refusing namespace deletion".into())
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Ordered set of policy rules. The first denial wins.
#[derive(Default)]
pub struct PolicyEngine {
    rules: Vec<Box<dyn PolicyRule>>,
}

impl PolicyEngine {
    /// Create an engine with no rules.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-in rules only.
    pub fn standard() -> Self {
        let mut engine = Self::new();
        engine.register(WriteClassification);
        engine.register(NamespaceDeletion);
        engine
    }

    /// Built-in rules followed by any configured deny patterns.
    ///
    /// Configuration can only add denials.
    pub fn with_config(config: &PolicyConfig) -> Self {
        let mut engine = Self::standard();
        if !config.extra_denied_patterns.is_empty() {
            engine.register(DeniedPatterns::new(config.extra_denied_patterns.clone()));
        }
        engine
    }

    /// Register a rule after the existing ones.
    pub fn register<R: PolicyRule + 'static>(&mut self, rule: R) {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate a step against every rule in order.
    pub fn evaluate(&self, step: &Step) -> Decision {
        for rule in &self.rules {
            match rule.check(step) {
                RuleOutcome::Pass => continue,
                RuleOutcome::Deny(reason) => {
                    tracing::debug!(rule = rule.name(), %reason, cmd = %step.joined(), "step denied");
                    return Decision::deny(reason);
                }
            }
        }
        Decision::allow()
    }
}

static STANDARD: LazyLock<PolicyEngine> = LazyLock::new(PolicyEngine::standard);

/// Evaluate a step against the built-in rules.
pub fn evaluate(step: &Step) -> Decision {
    STANDARD.evaluate(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(cmd: &[&str], read_only: bool) -> Step {
        Step::new(cmd.iter().copied(), read_only)
    }

    #[test]
    fn write_verbs_marked_read_only_are_denied() {
        for verb in WRITE_VERBS {
            let decision = evaluate(&step(&[verb, "something"], true));
            assert!(!decision.allowed, "{verb} should be denied");
            assert_eq!(decision.reason, "write-like command marked read_only");
        }
    }

    #[test]
    fn namespace_deletion_is_always_denied() {
        for cmd in [
            &["delete", "namespace", "prod"][..],
            &["delete", "ns", "prod"][..],
            &["delete", "ns"][..],
        ] {
            let decision = evaluate(&step(cmd, false));
            assert!(!decision.allowed);
            assert_eq!(decision.reason, "Refusing namespace deletion");
        }

        // read-only claim trips the first rule before the deny list
        let decision = evaluate(&step(&["delete", "namespace", "prod"], true));
        assert_eq!(decision.reason, "write-like command marked read_only");
    }

    #[test]
    fn reads_and_declared_writes_are_allowed() {
        assert_eq!(evaluate(&step(&["get", "pods"], true)), Decision::allow());
        assert_eq!(evaluate(&step(&["describe", "pod", "x"], false)), Decision::allow());
        assert_eq!(evaluate(&step(&["delete", "pod", "x"], false)), Decision::allow());
        assert_eq!(evaluate(&step(&[], true)), Decision::allow());
    }

    #[test]
    fn verb_class_ignores_later_tokens() {
        assert_eq!(VerbClass::of(&Step::new(["get", "delete"], true).cmd), VerbClass::Read);
        assert_eq!(VerbClass::of(&Step::new(["scale", "deploy/x"], false).cmd), VerbClass::Write);
        // verbs are matched exactly
        assert_eq!(VerbClass::of(&Step::new(["Delete", "pod"], true).cmd), VerbClass::Read);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let s = step(&["patch", "deploy/api", "-p", "{}"], true);
        assert_eq!(evaluate(&s), evaluate(&s));

        let s = step(&["logs", "api-0"], true);
        assert_eq!(evaluate(&s), evaluate(&s));
    }

    #[test]
    fn configured_patterns_only_tighten() {
        let engine = PolicyEngine::with_config(&PolicyConfig {
            extra_denied_patterns: vec!["delete pvc".into()],
        });
        assert_eq!(
            engine.rule_names(),
            ["write-classification", "namespace-deletion", "denied-patterns"]
        );

        assert!(!engine.evaluate(&step(&["delete", "pvc", "data"], false)).allowed);
        assert!(engine.evaluate(&step(&["delete", "pod", "x"], false)).allowed);
        assert!(!engine.evaluate(&step(&["delete", "ns", "x"], false)).allowed);
    }

    #[test]
    fn empty_engine_allows_everything() {
        let engine = PolicyEngine::new();
        assert!(engine.evaluate(&step(&["delete", "namespace", "prod"], true)).allowed);
    }
}
