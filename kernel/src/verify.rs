// Post-execution verification: a read-only pod listing for the operator.

use crate::probe::ClusterProbe;

/// Current wide pod listing, or a note explaining why it is missing.
pub fn verify(probe: &ClusterProbe<'_>, namespace: &str) -> String {
    match probe.pods_table(namespace) {
        Ok(out) if out.success() => out.stdout.trim().to_string(),
        Ok(out) => format!("(pod listing failed: {})", out.combined()),
        Err(err) => format!("(pod listing failed: {err})"),
    }
}
