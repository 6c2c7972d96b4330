//! Table and JSON rendering for command results.

use anyhow::Result;
use console::{Alignment, pad_str, style};
use serde::Serialize;

use shipyard_core::backup::{RestoreOutcome, RestoreReport};
use shipyard_core::deploy::{DeploymentHistory, DeploymentRecord, RollbackOutcome};
use shipyard_core::package::{Package, RegisterOutcome};
use shipyard_core::types::{DeploymentStatus, SnapshotId};
use shipyard_core::verify::{EndpointStatus, ProbeReport};

use crate::OutputFormat;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_label(status: DeploymentStatus) -> String {
    let text = status.to_string();
    let styled = match status {
        DeploymentStatus::Applied => style(text).green(),
        DeploymentStatus::Failed => style(text).red(),
        DeploymentStatus::Cancelled => style(text).yellow(),
        DeploymentStatus::RolledBack => style(text).cyan(),
        DeploymentStatus::Pending => style(text).dim(),
    };
    styled.to_string()
}

fn cell(text: &str, width: usize) -> String {
    pad_str(text, width, Alignment::Left, Some("…")).into_owned()
}

pub fn print_registered(
    package: &Package,
    outcome: RegisterOutcome,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "outcome": match outcome {
                RegisterOutcome::Registered => "registered",
                RegisterOutcome::Unchanged => "unchanged",
            },
            "package": package,
        }));
    }

    match outcome {
        RegisterOutcome::Registered => println!(
            "{} {} ({} files, script {})",
            style("Registered").green().bold(),
            package.id,
            package.contents.len(),
            package.script
        ),
        RegisterOutcome::Unchanged => {
            println!("{} is already registered with identical content", package.id)
        }
    }
    Ok(())
}

pub fn print_packages(packages: &[Package], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(packages);
    }
    if packages.is_empty() {
        println!("No packages registered.");
        println!("Add one with: shipyard upload <archive>");
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:<6} {:<20} Description",
        "Id", "Version", "Files", "Uploaded"
    );
    println!("{}", "-".repeat(80));
    for package in packages {
        println!(
            "{} {:<12} {:<6} {:<20} {}",
            cell(package.id.as_str(), 24),
            package.version,
            package.contents.len(),
            package.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
            package.description
        );
    }
    Ok(())
}

pub fn print_history(history: &DeploymentHistory, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(history);
    }
    if history.records.is_empty() {
        println!("No deployments yet.");
        return Ok(());
    }

    println!(
        "  {:<36} {:<20} {:<12} {:<20} Failure",
        "Id", "Package", "Status", "Started"
    );
    println!("  {}", "-".repeat(100));
    for record in &history.records {
        let marker = if history.current.as_ref() == Some(&record.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} {} {} {:<20} {}",
            marker,
            cell(record.id.as_str(), 36),
            cell(record.package.as_str(), 20),
            cell(&status_label(record.status), 12),
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.failure_message().unwrap_or("-")
        );
    }
    println!();
    println!("* current deployment");
    Ok(())
}

pub fn print_record(record: &DeploymentRecord, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(record);
    }

    println!("Deployment {}", style(&record.id).bold());
    println!("  Package:   {}", record.package);
    println!("  Target:    {}", record.target_root.display());
    println!("  Status:    {}", status_label(record.status));
    println!(
        "  Snapshot:  {}",
        record.snapshot.as_ref().map(|s| s.as_str()).unwrap_or("-")
    );
    println!("  Started:   {}", record.started_at.to_rfc3339());
    if let Some(finished) = record.finished_at {
        println!("  Finished:  {}", finished.to_rfc3339());
    }
    if let Some(failure) = &record.failure {
        println!(
            "  Failure:   {} ({:?})",
            style(&failure.message).red(),
            failure.kind
        );
    }

    for step in &record.steps {
        let code = step
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "\n  Step {}: {} (exit {}, {} ms{})",
            style(&step.task).bold(),
            if step.success { "ok" } else { "failed" },
            code,
            step.duration_ms,
            if step.timed_out { ", timed out" } else { "" }
        );
        print_log("stdout", &step.stdout);
        print_log("stderr", &step.stderr);
    }

    if let Some(report) = &record.verification {
        println!();
        print_probe_table(report);
    }
    if let Some(rollback) = &record.rollback {
        println!("\n  Rolled back at {}", rollback.at.to_rfc3339());
        print_restore_table(&rollback.report);
    }
    Ok(())
}

fn print_log(label: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    println!("    {}:", style(label).dim());
    for line in text.lines() {
        println!("      {}", line);
    }
}

pub fn print_probe(report: &ProbeReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }
    print_probe_table(report);
    Ok(())
}

fn print_probe_table(report: &ProbeReport) {
    println!("  {:<50} {:<12} Latency", "Endpoint", "Status");
    println!("  {}", "-".repeat(72));
    for result in &report.results {
        let status = match &result.status {
            EndpointStatus::Healthy { http_status } => {
                style(format!("ok {}", http_status)).green().to_string()
            }
            EndpointStatus::Unhealthy { http_status } => {
                style(format!("bad {}", http_status)).red().to_string()
            }
            EndpointStatus::Timeout => style("timeout").red().to_string(),
            EndpointStatus::Error { message } => style(format!("error: {}", message)).red().to_string(),
        };
        println!(
            "  {} {} {} ms",
            cell(result.endpoint.as_str(), 50),
            cell(&status, 12),
            result.latency_ms
        );
    }
    println!(
        "  {} of {} endpoints healthy",
        report.results.len() - report.failed_count(),
        report.results.len()
    );
}

pub fn print_rollback(outcome: &RollbackOutcome, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let (kind, record) = match outcome {
            RollbackOutcome::RolledBack(record) => ("rolled-back", record),
            RollbackOutcome::AlreadyRolledBack(record) => ("already-rolled-back", record),
        };
        return print_json(&serde_json::json!({ "outcome": kind, "record": record }));
    }

    match outcome {
        RollbackOutcome::RolledBack(record) => {
            println!(
                "{} {} ({})",
                style("Rolled back").cyan().bold(),
                record.id,
                record.package
            );
            if let Some(rollback) = &record.rollback {
                print_restore_table(&rollback.report);
            }
        }
        RollbackOutcome::AlreadyRolledBack(record) => {
            println!("{} was already rolled back; nothing to do", record.id);
        }
    }
    Ok(())
}

fn print_restore_table(report: &RestoreReport) {
    for file in &report.files {
        let outcome = match &file.outcome {
            RestoreOutcome::Restored => style("restored".to_string()).green(),
            RestoreOutcome::Unchanged => style("unchanged".to_string()).dim(),
            RestoreOutcome::Removed => style("removed".to_string()).yellow(),
            RestoreOutcome::StillAbsent => style("absent".to_string()).dim(),
            RestoreOutcome::Failed { message } => style(format!("failed: {}", message)).red(),
        };
        println!("    {} {}", cell(&outcome.to_string(), 12), file.path);
    }
}

pub fn print_pruned(removed: &[SnapshotId], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(removed);
    }
    if removed.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }
    for id in removed {
        println!("Deleted snapshot {}", id);
    }
    println!("{} snapshot(s) removed", removed.len());
    Ok(())
}
