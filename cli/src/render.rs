// Terminal output for reports.

use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use kubemedic_kernel::audit::AuditLocation;
use kubemedic_kernel::execute::{ExecutionResult, StepResult};
use kubemedic_kernel::incident::Incident;
use kubemedic_kernel::pipeline::RunObserver;
use kubemedic_kernel::plan::Plan;
use kubemedic_kernel::triage::TriageReport;

pub fn section(title: &str, body: &str) {
    println!("{}", format!("== {title} ==").bold().cyan());
    if body.trim().is_empty() {
        println!("(empty)");
    } else {
        println!("{}", body.trim_end());
    }
    println!();
}

pub fn warning(title: &str, body: &str) {
    println!("{}", format!("== {title} ==").bold().yellow());
    println!("{}", body.trim_end());
    println!();
}

fn step_line(result: &StepResult) -> String {
    let mark = if result.ok {
        "ok".green().to_string()
    } else {
        "FAILED".red().to_string()
    };
    let ns = result
        .step
        .namespace
        .as_deref()
        .map(|ns| format!(" (-n {ns})"))
        .unwrap_or_default();
    format!("[{mark}] {}{ns}\n{}", result.step.joined(), indent(&result.output))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn execution(results: &ExecutionResult) {
    let steps = if results.steps.is_empty() {
        "(no plan steps)".to_string()
    } else {
        results
            .steps
            .iter()
            .map(step_line)
            .collect::<Vec<_>>()
            .join("\n")
    };
    section("Plan steps", &steps);

    if let Some(fix) = &results.fix {
        section("Recommended fix", &step_line(fix));
    }
}

pub fn audit(audit: &Result<AuditLocation, String>) {
    match audit {
        Ok(location) => section("Audit record", location.as_str()),
        Err(err) => warning("Audit record not written", err),
    }
}

/// Prints each run stage as soon as it completes.
pub struct RunPrinter;

impl RunObserver for RunPrinter {
    fn incident_collected(&mut self, incident: &Incident) {
        section(
            "Context",
            &format!(
                "kubectl context: {}\nnamespace: {} ({} pods, {} events)",
                incident.context,
                incident.namespace,
                incident.pods.len(),
                incident.events.len()
            ),
        );
    }

    fn plan_received(&mut self, plan: &Plan) {
        section("Plan summary", or_placeholder(&plan.summary, "(no summary)"));
        section("Diagnosis", or_placeholder(&plan.diagnosis, "(no diagnosis)"));
    }

    fn plan_executed(&mut self, results: &ExecutionResult) {
        execution(results);
    }

    fn audit_written(&mut self, result: &Result<AuditLocation, String>) {
        audit(result);
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

/// Table of classified pods.
fn issue_table(report: &TriageReport) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Pod").fg(Color::Cyan),
        Cell::new("Phase").fg(Color::Cyan),
        Cell::new("Restarts").fg(Color::Cyan),
        Cell::new("Likely issue").fg(Color::Cyan),
        Cell::new("Suggested next actions").fg(Color::Cyan),
    ]);

    for issue in &report.issues {
        table.add_row(vec![
            Cell::new(&issue.pod),
            Cell::new(&issue.phase),
            Cell::new(&issue.restarts),
            Cell::new(issue.issue.label()).fg(Color::Red),
            Cell::new(issue.suggestion),
        ]);
    }

    table
}

pub fn triage(report: &TriageReport) {
    if let Some(context) = &report.context {
        section("Context", &format!("kubectl context: {context}"));
    }
    section(&format!("Pods in {}", report.namespace), &report.pods_table);

    if report.is_healthy() {
        section("Result", &"No failing pods detected.".green().to_string());
        return;
    }

    section("Triage summary", &issue_table(report).to_string());
    if report.not_inspected() > 0 {
        warning(
            "Not inspected",
            &format!(
                "{} more unhealthy pod(s) beyond --max-pods: {}",
                report.not_inspected(),
                report.unhealthy[report.issues.len()..].join(", ")
            ),
        );
    }

    if let Some(logs) = &report.top_logs {
        if let Some(previous) = &logs.previous {
            section(&format!("Logs (previous): {}", logs.pod), previous);
        }
        if let Some(current) = &logs.current {
            section(&format!("Logs (current): {}", logs.pod), current);
        }
    }

    section(
        "Dry-run commands (recommended, no changes executed)",
        &report.dry_run.join("\n"),
    );
}
