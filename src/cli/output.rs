//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ConfigHasher;
use crate::deploy::{DeployReport, EggOutcome, EggSummary, RollbackPlan};
use crate::mothergoose::EggStatus;
use crate::planner::{DeploymentPlan, PlanStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Result of validating one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileValidation {
    /// Path as shown to the user.
    pub path: String,
    /// Parse or validation error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileValidation {
    /// Returns `true` if the file passed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Egg outcome row for table display.
#[derive(Tabled)]
struct EggOutcomeRow {
    #[tabled(rename = "Egg")]
    egg: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Config hash")]
    hash: String,
}

/// Runner row for table display.
#[derive(Tabled)]
struct RunnerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    runner_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Cloud")]
    cloud: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Last heartbeat")]
    last_heartbeat: String,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Plan")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Config hash")]
    hash: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

/// Egg summary row for `status --all`.
#[derive(Tabled)]
struct EggSummaryRow {
    #[tabled(rename = "Egg")]
    egg: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Runners")]
    runners: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the results of validating one or more files.
    #[must_use]
    pub fn format_validation(&self, results: &[FileValidation]) -> String {
        let valid = results.iter().filter(|r| r.is_valid()).count();
        let errors = results.len() - valid;

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": valid,
                    "errors": errors,
                    "files": results,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for result in results {
                    let _ = writeln!(output, "📄 {}", result.path);
                    match &result.error {
                        None => {
                            let _ = writeln!(output, "   {} Valid\n", "✓".green());
                        }
                        Some(error) => {
                            let _ = writeln!(output, "   {} {error}\n", "✗".red());
                        }
                    }
                }
                output.push_str(&"─".repeat(50));
                let _ = writeln!(output, "\nSummary: {valid} valid, {errors} errors");
                output
            }
        }
    }

    /// Formats a deploy report.
    #[must_use]
    pub fn format_deploy(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_text(report),
        }
    }

    fn format_deploy_text(report: &DeployReport) -> String {
        let mut output = String::new();
        let hasher = ConfigHasher::new();

        let title = if report.dry_run {
            "Deployment Plan (dry run)"
        } else {
            "Deployment"
        };
        let _ = write!(output, "\n🪿 {title}\n\n");

        let rows: Vec<EggOutcomeRow> = report
            .eggs
            .iter()
            .map(|e| {
                let (result, plan, hash) = match &e.outcome {
                    EggOutcome::Unchanged { config_hash } => (
                        "unchanged".dimmed().to_string(),
                        String::from("-"),
                        hasher.short_hash(config_hash),
                    ),
                    EggOutcome::Planned { plan } => (
                        "planned".yellow().to_string(),
                        plan.short_id().to_string(),
                        hasher.short_hash(&plan.config_hash),
                    ),
                    EggOutcome::Submitted { plan } => (
                        "submitted".green().to_string(),
                        plan.short_id().to_string(),
                        hasher.short_hash(&plan.config_hash),
                    ),
                    EggOutcome::Failed { .. } => {
                        ("failed".red().to_string(), String::from("-"), String::from("-"))
                    }
                };
                EggOutcomeRow {
                    egg: e.egg.clone(),
                    result,
                    plan,
                    hash,
                }
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let failures: Vec<_> = report
            .eggs
            .iter()
            .filter_map(|e| match &e.outcome {
                EggOutcome::Failed { error } => Some((&e.egg, &e.source, error)),
                _ => None,
            })
            .collect();
        if !failures.is_empty() {
            let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
            for (egg, source, error) in failures {
                let _ = writeln!(output, "   - {egg} ({}): {error}", source.display());
            }
        }

        let _ = write!(
            output,
            "\nEggs: {} changed, {} unchanged, {} failed\n",
            report.changed_count().to_string().green(),
            report.unchanged_count(),
            report.failed_count().to_string().red()
        );
        if report.dry_run && report.changed_count() > 0 {
            output.push_str("No resources were created.\n");
        }

        output
    }

    /// Formats the status of one egg.
    #[must_use]
    pub fn format_egg_status(&self, status: &EggStatus) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(status).unwrap_or_default(),
            OutputFormat::Text => Self::format_egg_status_text(status),
        }
    }

    fn format_egg_status_text(status: &EggStatus) -> String {
        let mut output = String::new();
        let _ = write!(output, "\n🥚 Egg: {}\n\n", status.egg_name);

        let Some(plan) = &status.latest_plan else {
            output.push_str("   No deployment found for this egg.\n");
            return output;
        };

        output.push_str("Current deployment:\n");
        Self::write_plan_details(&mut output, plan);

        if !status.active_runners.is_empty() {
            let _ = write!(output, "\nActive runners ({}):\n", status.active_runners.len());
            let rows: Vec<RunnerRow> = status
                .active_runners
                .iter()
                .map(|r| RunnerRow {
                    id: Self::truncate(&r.id, 12),
                    runner_type: r.runner_type.clone(),
                    state: Self::format_runner_state(&r.state),
                    cloud: r.cloud_provider.clone(),
                    region: r.region.clone(),
                    last_heartbeat: r.last_heartbeat.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !status.deployment_history.is_empty() {
            let _ = write!(
                output,
                "\nDeployment history ({} plans):\n",
                status.deployment_history.len()
            );
            let rows: Vec<PlanRow> = status
                .deployment_history
                .iter()
                .rev()
                .map(|p| PlanRow {
                    id: p.short_id().to_string(),
                    status: Self::format_plan_status(p.status),
                    hash: ConfigHasher::new().short_hash(&p.config_hash),
                    created_at: p.created_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    fn write_plan_details(output: &mut String, plan: &DeploymentPlan) {
        let _ = writeln!(output, "   Plan ID:     {}", plan.id);
        let _ = writeln!(output, "   Status:      {}", Self::format_plan_status(plan.status));
        let _ = writeln!(output, "   Config hash: {}", plan.config_hash);
        let _ = writeln!(output, "   Created at:  {}", plan.created_at.to_rfc3339());
        if let Some(applied_at) = plan.applied_at {
            let _ = writeln!(output, "   Applied at:  {}", applied_at.to_rfc3339());
        }
        let _ = writeln!(output, "   Plan type:   {}", plan.plan_type);
        for (key, value) in &plan.metadata {
            let shown = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            let _ = writeln!(output, "   {key}: {shown}");
        }
    }

    /// Formats the status of every egg.
    #[must_use]
    pub fn format_status_all(&self, summaries: &[EggSummary]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summaries).unwrap_or_default(),
            OutputFormat::Text => {
                if summaries.is_empty() {
                    return String::from("No eggs found.\n");
                }

                let rows: Vec<EggSummaryRow> = summaries
                    .iter()
                    .map(|s| {
                        let plan = s.status.as_ref().and_then(|st| st.latest_plan.as_ref());
                        EggSummaryRow {
                            egg: s.egg.clone(),
                            status: plan.map_or_else(
                                || "not deployed".dimmed().to_string(),
                                |p| Self::format_plan_status(p.status),
                            ),
                            plan: plan.map_or_else(|| String::from("-"), |p| p.short_id().to_string()),
                            runners: s.status.as_ref().map_or(0, |st| st.active_runners.len()),
                        }
                    })
                    .collect();

                let mut output = String::from("\n🪿 All eggs\n\n");
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a rollback plan before confirmation.
    #[must_use]
    pub fn format_rollback(&self, rollback: &RollbackPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(rollback).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(output, "\n⏪ Rollback Plan\n\n");
                let _ = writeln!(output, "   Current plan: {}", rollback.current.id);
                let _ = writeln!(output, "   Target plan:  {}", rollback.target.id);
                let _ = writeln!(output, "   Created at:   {}", rollback.target.created_at.to_rfc3339());
                let _ = write!(
                    output,
                    "\nRollback egg '{}' from {} to {}\n",
                    rollback.egg,
                    rollback.current.short_id(),
                    rollback.target.short_id()
                );
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "success", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✓".green()),
        }
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "warning", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "⚠".yellow()),
        }
    }

    /// Formats a plan status with color.
    fn format_plan_status(status: PlanStatus) -> String {
        match status {
            PlanStatus::Applied => "applied".green().to_string(),
            PlanStatus::Pending => "pending".yellow().to_string(),
            PlanStatus::RolledBack => "rolled_back".dimmed().to_string(),
            PlanStatus::Failed => "failed".red().to_string(),
        }
    }

    /// Formats a runner state with color.
    fn format_runner_state(state: &str) -> String {
        match state {
            "active" => state.green().to_string(),
            "dormant" => state.yellow().to_string(),
            "failed" => state.red().to_string(),
            other => other.to_string(),
        }
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::EggDeployment;
    use crate::mothergoose::Runner;
    use crate::planner::PlanType;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn plan(id: &str, status: PlanStatus) -> DeploymentPlan {
        DeploymentPlan {
            id: id.to_string(),
            egg_name: String::from("my-app"),
            plan_type: PlanType::Runner,
            config_hash: String::from("0123456789abcdef"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            applied_at: None,
            status,
            rollback_plan: None,
            metadata: BTreeMap::from([(String::from("region"), serde_json::json!("ru-central1-a"))]),
            plan_blob: None,
        }
    }

    fn report() -> DeployReport {
        DeployReport {
            dry_run: true,
            eggs: vec![
                EggDeployment {
                    egg: String::from("my-app"),
                    source: PathBuf::from("Eggs/my-app/config.fly"),
                    outcome: EggOutcome::Planned {
                        plan: plan("aaaaaaaa-1111", PlanStatus::Pending),
                    },
                },
                EggDeployment {
                    egg: String::from("broken"),
                    source: PathBuf::from("Eggs/broken/config.fly"),
                    outcome: EggOutcome::Failed {
                        error: String::from("cpu must be between 1 and 128, got 0"),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_deploy_text() {
        let text = OutputFormatter::new(OutputFormat::Text).format_deploy(&report());
        assert!(text.contains("dry run"));
        assert!(text.contains("aaaaaaaa"));
        assert!(text.contains("broken (Eggs/broken/config.fly): cpu must be between 1 and 128, got 0"));
        assert!(text.contains("No resources were created."));
    }

    #[test]
    fn test_deploy_json() {
        let json = OutputFormatter::new(OutputFormat::Json).format_deploy(&report());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["eggs"][0]["outcome"], "planned");
        assert_eq!(value["eggs"][0]["plan"]["status"], "pending");
        assert_eq!(value["eggs"][1]["outcome"], "failed");
    }

    #[test]
    fn test_validation_summary() {
        let results = vec![
            FileValidation {
                path: String::from("Eggs/a/config.fly"),
                error: None,
            },
            FileValidation {
                path: String::from("Jobs/b.fly"),
                error: Some(String::from("parse errors")),
            },
        ];
        let text = OutputFormatter::new(OutputFormat::Text).format_validation(&results);
        assert!(text.contains("Summary: 1 valid, 1 errors"));

        let json = OutputFormatter::new(OutputFormat::Json).format_validation(&results);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["errors"], 1);
        assert!(value["files"][0].get("error").is_none());
    }

    #[test]
    fn test_egg_status_text() {
        let heartbeat = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let status = EggStatus {
            egg_name: String::from("my-app"),
            latest_plan: Some(plan("bbbbbbbb-2222", PlanStatus::Applied)),
            deployment_history: vec![plan("bbbbbbbb-2222", PlanStatus::Applied)],
            active_runners: vec![Runner {
                id: String::from("runner-1"),
                egg_name: String::from("my-app"),
                runner_type: String::from("vm"),
                state: String::from("active"),
                cloud_provider: String::from("yandex"),
                region: String::from("ru-central1-a"),
                created_at: heartbeat,
                last_heartbeat: heartbeat,
            }],
            config_hash: String::from("0123456789abcdef"),
        };

        let text = OutputFormatter::new(OutputFormat::Text).format_egg_status(&status);
        assert!(text.contains("Plan ID:     bbbbbbbb-2222"));
        assert!(text.contains("region: ru-central1-a"));
        assert!(text.contains("Active runners (1)"));
        assert!(text.contains("runner-1"));
        assert!(text.contains("Deployment history (1 plans)"));
    }

    #[test]
    fn test_status_not_deployed() {
        let status = EggStatus {
            egg_name: String::from("ghost"),
            latest_plan: None,
            deployment_history: vec![],
            active_runners: vec![],
            config_hash: String::new(),
        };
        let text = OutputFormatter::new(OutputFormat::Text).format_egg_status(&status);
        assert!(text.contains("No deployment found"));

        let summaries = vec![EggSummary {
            egg: String::from("ghost"),
            status: None,
        }];
        let text = OutputFormatter::new(OutputFormat::Text).format_status_all(&summaries);
        assert!(text.contains("ghost"));
        assert!(text.contains("not deployed"));
    }

    #[test]
    fn test_rollback_text() {
        let rollback = RollbackPlan {
            egg: String::from("my-app"),
            current: plan("cccccccc-3333", PlanStatus::Applied),
            target: plan("dddddddd-4444", PlanStatus::Applied),
        };
        let text = OutputFormatter::new(OutputFormat::Text).format_rollback(&rollback);
        assert!(text.contains("Rollback egg 'my-app' from cccccccc to dddddddd"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 12), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghijklmnop", 8), "abcde...");
    }
}
