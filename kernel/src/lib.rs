// kubemedic Kernel
//
// Policy-gated incident response for a Kubernetes namespace:
// probe → classify/plan → policy → execute → audit → verify.

pub mod adapters;
pub mod audit;
pub mod classify;
pub mod config;
pub mod execute;
pub mod incident;
pub mod pipeline;
pub mod plan;
pub mod policy;
pub mod probe;
pub mod remediate;
pub mod triage;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;
