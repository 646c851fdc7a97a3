mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kubemedic_kernel::adapters::kubectl::table::ColumnarPodTable;
use kubemedic_kernel::audit::{AuditLog, FsAuditStore};
use kubemedic_kernel::config::AgentConfig;
use kubemedic_kernel::execute::ExecutionResult;
use kubemedic_kernel::incident::Incident;
use kubemedic_kernel::pipeline::{run_incident, RunOptions, RunReport, Silent};
use kubemedic_kernel::plan::oracle::OllamaPlanner;
use kubemedic_kernel::plan::Plan;
use kubemedic_kernel::policy::PolicyEngine;
use kubemedic_kernel::probe::{ClusterProbe, KubectlRunner};
use kubemedic_kernel::remediate::{RemediationAction, RemediationOutcome, Remediator};
use kubemedic_kernel::triage::{triage, TriageOptions};

/// kubemedic incident responder CLI
#[derive(Parser, Debug)]
#[command(name = "kubemedic")]
#[command(about = "Policy-gated incident response for a Kubernetes namespace", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to agent config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON instead of sections
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Triage -> plan -> (optional) execute -> audit -> verify
    Run {
        #[arg(short, long, default_value = "demo")]
        namespace: String,

        /// Allow write steps to execute
        #[arg(long)]
        approve: bool,

        /// Maximum pods to collect (defaults to config)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_pods: Option<usize>,
    },

    /// Read-only triage: pods/events/describe/logs -> diagnosis + suggested actions
    Triage {
        #[arg(short, long, default_value = "demo")]
        namespace: String,

        /// Inspect this pod instead of scanning for failing ones
        #[arg(short, long)]
        pod: Option<String>,

        /// Maximum unhealthy pods to inspect (defaults to config)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_pods: Option<usize>,
    },

    /// Delete a single pod (its controller recreates it)
    DeletePod {
        #[arg(short, long, default_value = "demo")]
        namespace: String,

        #[arg(short, long)]
        pod: String,

        /// Required to execute changes
        #[arg(long)]
        approve: bool,
    },

    /// Rollout restart a deployment
    RolloutRestart {
        #[arg(short, long, default_value = "demo")]
        namespace: String,

        #[arg(short = 'd', long = "deploy")]
        deployment: String,

        /// Required to execute changes
        #[arg(long)]
        approve: bool,
    },

    /// Replace a deployment's container command to recover a crash loop
    PatchCommand {
        #[arg(short, long, default_value = "demo")]
        namespace: String,

        #[arg(short = 'd', long = "deploy")]
        deployment: String,

        /// Required to execute changes
        #[arg(long)]
        approve: bool,
    },
}

/// Wrapper for JSON run output
#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    incident: &'a Incident,
    plan: &'a Plan,
    results: &'a ExecutionResult,
    approved: bool,
    audit_record: Option<&'a str>,
    audit_error: Option<&'a str>,
    verification: &'a str,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kubemedic=debug,kubemedic_kernel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ----------------------------
    // Load config
    // ----------------------------
    let config = AgentConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(?config, "configuration loaded");

    let runner = KubectlRunner::new(config.kubectl.clone());
    let probe = ClusterProbe::new(&runner, config.command_timeout());
    let policy = PolicyEngine::with_config(&config.policy);

    match cli.command {
        Commands::Run {
            namespace,
            approve,
            max_pods,
        } => run(&config, &probe, &policy, namespace, approve, max_pods, cli.json),

        Commands::Triage {
            namespace,
            pod,
            max_pods,
        } => {
            let options = TriageOptions {
                namespace,
                pod,
                max_pods: max_pods.unwrap_or(config.max_pods),
                log_tail: config.triage_log_tail,
            };
            let report = triage(&probe, &ColumnarPodTable, &options)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render::triage(&report);
            }
            Ok(())
        }

        Commands::DeletePod {
            namespace,
            pod,
            approve,
        } => remediate(
            &config,
            &probe,
            &policy,
            &namespace,
            RemediationAction::DeletePod { pod },
            approve,
        ),

        Commands::RolloutRestart {
            namespace,
            deployment,
            approve,
        } => remediate(
            &config,
            &probe,
            &policy,
            &namespace,
            RemediationAction::RolloutRestart { deployment },
            approve,
        ),

        Commands::PatchCommand {
            namespace,
            deployment,
            approve,
        } => remediate(
            &config,
            &probe,
            &policy,
            &namespace,
            RemediationAction::PatchCommand { deployment },
            approve,
        ),
    }
}

fn run(
    config: &AgentConfig,
    probe: &ClusterProbe<'_>,
    policy: &PolicyEngine,
    namespace: String,
    approved: bool,
    max_pods: Option<usize>,
    json: bool,
) -> Result<()> {
    let oracle = OllamaPlanner::new(config.oracle.clone()).context("failed to configure planner")?;
    let mut audit = AuditLog::new(FsAuditStore::new(&config.runs_dir));

    let mut collect = config.collect_options();
    if let Some(max_pods) = max_pods {
        collect.max_pods = max_pods;
    }
    let options = RunOptions {
        namespace,
        approved,
        collect,
    };

    let RunReport {
        incident,
        plan,
        results,
        audit: audit_result,
        verification,
    } = if json {
        run_incident(probe, &oracle, policy, &mut audit, &options, &mut Silent)?
    } else {
        run_incident(probe, &oracle, policy, &mut audit, &options, &mut render::RunPrinter)?
    };

    if json {
        let output = RunOutput {
            incident: &incident,
            plan: &plan,
            results: &results,
            approved,
            audit_record: audit_result.as_ref().ok().map(|l| l.as_str()),
            audit_error: audit_result.as_ref().err().map(String::as_str),
            verification: &verification,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        render::section("Verify pods", &verification);
    }

    Ok(())
}

fn remediate(
    config: &AgentConfig,
    probe: &ClusterProbe<'_>,
    policy: &PolicyEngine,
    namespace: &str,
    action: RemediationAction,
    approved: bool,
) -> Result<()> {
    let mut audit = AuditLog::new(FsAuditStore::new(&config.runs_dir));
    let remediator = Remediator::new(*probe, policy, config.settle_delay());

    match remediator.apply(namespace, &action, approved, &mut audit) {
        RemediationOutcome::DryRun { would_run } => {
            render::warning(
                "Dry-run",
                &format!("Refusing to change cluster without --approve\nWould run: {would_run}"),
            );
        }
        RemediationOutcome::Applied(applied) => {
            render::section(
                &format!("{} {}", action.name(), action.target()),
                &applied.result.output,
            );
            render::audit(&applied.audit);
            render::section(&format!("Pods in {namespace} (post-action)"), &applied.post_action);
        }
    }

    Ok(())
}
