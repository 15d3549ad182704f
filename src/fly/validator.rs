//! Semantic validation of Fly documents.
//!
//! The validator walks every top-level block and checks it against the schema
//! for its kind. It never stops at the first problem: all diagnostics for a
//! document are collected into one [`ValidationReport`].

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::{CloudProvider, RunnerKind, parse_duration};

use super::ast::{Block, Config};
use super::position::Position;
use super::printer::format_number;
use super::value::Value;

const POLICY_ACTIONS: &[&str] = &["terminate", "demote_to_nadir", "promote_to_apex"];

const MOTHERGOOSE_SECTIONS: &[&str] = &[
    "api_gateway",
    "fastapi_app",
    "celery_workers",
    "uglyfox_workers",
    "message_queues",
    "triggers",
    "database",
    "storage",
    "service_accounts",
];

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    /// Where the offending value or block starts.
    pub position: Position,
    /// Dotted path of the enclosing block, e.g. `egg.my-app.resources`.
    pub path: String,
    /// Offending field, e.g. `cpu` or `tags[1]`.
    pub field: String,
    /// Human readable message.
    pub message: String,
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (field: {})", self.position, self.message, self.field)
    }
}

/// Ordered diagnostics for one or more documents.
///
/// An empty report is `ok`. A non-empty report is also an error value so it
/// can be returned directly from fallible pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    /// Returns `true` when no diagnostics were recorded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Recorded diagnostics, in discovery order.
    #[must_use]
    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    /// Number of diagnostics.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Records a diagnostic.
    pub fn add_error(
        &mut self,
        position: Position,
        path: &str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            position,
            path: path.to_string(),
            field: field.into(),
            message: message.into(),
        });
    }

    /// Appends every diagnostic of `other`.
    pub fn merge(&mut self, other: Self) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// One-line summary, e.g. `validation failed with 2 error(s)`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("validation failed with {} error(s)", self.diagnostics.len())
    }

    /// Converts the report into a result.
    ///
    /// # Errors
    ///
    /// Returns the report itself when it holds any diagnostic.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.summary())?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Where a file sits in a repository, which constrains its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `Eggs/<name>/config.fly`.
    Egg,
    /// `Jobs/<name>.fly`.
    Job,
    /// `UF/config.fly`.
    UglyFox,
    /// Anywhere else; no constraint.
    Unconstrained,
}

/// Returns `true` for names of the form `[A-Za-z][A-Za-z0-9_-]*`.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_cron_expression(expr: &str) -> bool {
    matches!(expr.split_whitespace().count(), 5 | 6)
}

/// The check applied to one attribute value.
#[derive(Debug, Clone, Copy)]
enum Check {
    String,
    OneOf(&'static [&'static str]),
    Number { min: f64, max: f64 },
    WholeNumber { min: f64, max: f64 },
    StringList,
    IdentifierList,
    Duration,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
}

/// Schema validator for Fly documents.
#[derive(Debug, Default)]
pub struct FlyValidator;

impl FlyValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a parsed document.
    #[must_use]
    pub fn validate(&self, config: &Config) -> ValidationReport {
        let mut report = ValidationReport::default();

        if config.is_empty() {
            report.add_error(
                config.position.clone(),
                "",
                "blocks",
                "configuration file is empty",
            );
            return report;
        }

        for block in &config.blocks {
            match block.block_type.as_str() {
                "egg" => Self::validate_egg(block, &mut report),
                "eggsbucket" => Self::validate_eggs_bucket(block, &mut report),
                "job" => Self::validate_job(block, &mut report),
                "uglyfox" => Self::validate_uglyfox(block, &mut report),
                "mothergoose" => Self::validate_mothergoose(block, &mut report),
                other => report.add_error(
                    block.position.clone(),
                    "",
                    "type",
                    format!("unknown block type: {other}"),
                ),
            }
        }

        debug!(
            "Validated {}: {} diagnostic(s)",
            config.position.file,
            report.error_count()
        );
        report
    }

    /// Checks that a document holds the block kinds its location requires.
    #[must_use]
    pub fn validate_placement(&self, config: &Config, placement: Placement) -> ValidationReport {
        let mut report = ValidationReport::default();

        let allowed: &[&str] = match placement {
            Placement::Egg => &["egg", "eggsbucket"],
            Placement::Job => &["job"],
            Placement::UglyFox => &["uglyfox"],
            Placement::Unconstrained => return report,
        };

        for block in &config.blocks {
            if !allowed.contains(&block.block_type.as_str()) {
                report.add_error(
                    block.position.clone(),
                    "",
                    "type",
                    format!(
                        "{} block is not allowed here; this location holds {}",
                        block.block_type,
                        allowed.join(" or ")
                    ),
                );
            }
        }

        if placement == Placement::UglyFox && config.block("uglyfox").is_none() {
            report.add_error(
                config.position.clone(),
                "",
                "uglyfox",
                "UF/config.fly must contain an uglyfox block",
            );
        }

        report
    }

    // ------------------------------------------------------------------
    // Top-level kinds
    // ------------------------------------------------------------------

    fn validate_egg(block: &Block, report: &mut ValidationReport) {
        let Some(path) = Self::named(block, "egg", "egg name", report) else {
            return;
        };

        Self::attr(block, &path, "type", Presence::Required, Check::OneOf(RunnerKind::ALL), report);

        for required in ["cloud", "resources", "runner", "gitlab"] {
            Self::require_block(block, &path, required, report);
        }
        Self::validate_runner_host(block, &path, report);

        if let Some(gitlab) = block.block("gitlab") {
            Self::validate_gitlab(gitlab, &path, report);
        }
    }

    fn validate_eggs_bucket(block: &Block, report: &mut ValidationReport) {
        let Some(path) = Self::named(block, "eggsbucket", "eggsbucket name", report) else {
            return;
        };

        Self::attr(block, &path, "type", Presence::Required, Check::OneOf(RunnerKind::ALL), report);

        for required in ["cloud", "resources", "runner", "repositories"] {
            Self::require_block(block, &path, required, report);
        }
        Self::validate_runner_host(block, &path, report);

        if let Some(repositories) = block.block("repositories") {
            Self::validate_repositories(repositories, &path, report);
        }
    }

    // Sections shared by eggs and buckets.
    fn validate_runner_host(block: &Block, path: &str, report: &mut ValidationReport) {
        if let Some(cloud) = block.block("cloud") {
            let path = child_path(path, cloud);
            Self::attr(cloud, &path, "provider", Presence::Required, Check::OneOf(CloudProvider::ALL), report);
            Self::attr(cloud, &path, "region", Presence::Required, Check::String, report);
        }

        if let Some(resources) = block.block("resources") {
            let path = child_path(path, resources);
            Self::attr(resources, &path, "cpu", Presence::Required, Check::Number { min: 1.0, max: 128.0 }, report);
            Self::attr(resources, &path, "memory", Presence::Required, Check::Number { min: 512.0, max: 524_288.0 }, report);
            Self::attr(resources, &path, "disk", Presence::Required, Check::Number { min: 10.0, max: 10_240.0 }, report);
            Self::attr(resources, &path, "type", Presence::Optional, Check::OneOf(RunnerKind::ALL), report);
        }

        if let Some(runner) = block.block("runner") {
            let path = child_path(path, runner);
            Self::attr(runner, &path, "tags", Presence::Required, Check::StringList, report);
            Self::attr(runner, &path, "concurrent", Presence::Required, Check::Number { min: 1.0, max: 100.0 }, report);
            Self::attr(runner, &path, "idle_timeout", Presence::Optional, Check::String, report);
        }

        if let Some(environment) = block.block("environment") {
            let path = child_path(path, environment);
            for (name, value) in &environment.attributes {
                if value.as_str().is_err() {
                    report.add_error(
                        value.position.clone(),
                        &path,
                        name.clone(),
                        format!(
                            "environment variable {name} must be a string, got {}",
                            value.value_type()
                        ),
                    );
                }
            }
        }
    }

    fn validate_gitlab(gitlab: &Block, parent: &str, report: &mut ValidationReport) {
        let path = child_path(parent, gitlab);
        Self::attr(gitlab, &path, "project_id", Presence::Required, Check::WholeNumber { min: 1.0, max: 999_999_999.0 }, report);
        Self::attr(gitlab, &path, "server_name", Presence::Required, Check::String, report);
        Self::attr(gitlab, &path, "token_secret", Presence::Required, Check::String, report);
    }

    fn validate_repositories(block: &Block, parent: &str, report: &mut ValidationReport) {
        let path = child_path(parent, block);
        let repos: Vec<&Block> = block.blocks_of("repo").collect();
        if repos.is_empty() {
            report.add_error(
                block.position.clone(),
                &path,
                "repo",
                "repositories block must contain at least one 'repo' block",
            );
            return;
        }

        let mut seen = HashSet::new();
        for repo in repos {
            let Some(repo_path) = Self::named(repo, "repo", "repo name", report) else {
                continue;
            };
            if let Some(name) = repo.name()
                && !seen.insert(name)
            {
                report.add_error(
                    repo.position.clone(),
                    &path,
                    "name",
                    format!("duplicate repository name \"{name}\""),
                );
            }
            Self::require_block(repo, &repo_path, "gitlab", report);
            if let Some(gitlab) = repo.block("gitlab") {
                Self::validate_gitlab(gitlab, &repo_path, report);
            }
        }
    }

    fn validate_job(block: &Block, report: &mut ValidationReport) {
        let Some(path) = Self::named(block, "job", "job name", report) else {
            return;
        };

        Self::attr(block, &path, "schedule", Presence::Required, Check::Cron, report);
        Self::attr(block, &path, "script", Presence::Required, Check::String, report);

        Self::require_block(block, &path, "runner", report);
        if let Some(runner) = block.block("runner") {
            let path = child_path(&path, runner);
            Self::attr(runner, &path, "type", Presence::Required, Check::OneOf(RunnerKind::ALL), report);
            Self::attr(runner, &path, "tags", Presence::Required, Check::StringList, report);
        }
    }

    fn validate_uglyfox(block: &Block, report: &mut ValidationReport) {
        let path = String::from("uglyfox");
        Self::forbid_labels(block, &path, report);

        Self::require_block(block, &path, "pruning", report);
        if let Some(pruning) = block.block("pruning") {
            let path = child_path(&path, pruning);
            Self::attr(pruning, &path, "failed_threshold", Presence::Required, Check::Number { min: 1.0, max: 100.0 }, report);
            Self::attr(pruning, &path, "max_age", Presence::Required, Check::Duration, report);
            Self::attr(pruning, &path, "check_interval", Presence::Required, Check::Duration, report);
        }

        let conditions: Vec<&Block> = block.blocks_of("runners_condition").collect();
        if conditions.is_empty() {
            report.add_error(
                block.position.clone(),
                &path,
                "runners_condition",
                "uglyfox block must have at least one 'runners_condition' block",
            );
        }
        for condition in conditions {
            Self::validate_runners_condition(condition, &path, report);
        }

        if let Some(policies) = block.block("policies") {
            Self::validate_policies(policies, &path, report);
        }
    }

    fn validate_runners_condition(block: &Block, parent: &str, report: &mut ValidationReport) {
        let Some(name) = Self::named(block, "runners_condition", "condition name", report) else {
            return;
        };
        let path = format!("{parent}.{name}");

        Self::attr(block, &path, "eggs_entities", Presence::Required, Check::IdentifierList, report);
        Self::require_block(block, &path, "apex", report);
        Self::require_block(block, &path, "nadir", report);

        if let Some(apex) = block.block("apex") {
            let pool_path = child_path(&path, apex);
            Self::validate_pool(apex, &pool_path, report);
            Self::attr(apex, &pool_path, "cpu_threshold", Presence::Optional, Check::Number { min: 0.0, max: 100.0 }, report);
            Self::attr(apex, &pool_path, "memory_threshold", Presence::Optional, Check::Number { min: 0.0, max: 100.0 }, report);
        }
        if let Some(nadir) = block.block("nadir") {
            let pool_path = child_path(&path, nadir);
            Self::validate_pool(nadir, &pool_path, report);
            Self::attr(nadir, &pool_path, "idle_timeout", Presence::Required, Check::Duration, report);
        }
    }

    fn validate_pool(pool: &Block, path: &str, report: &mut ValidationReport) {
        Self::attr(pool, path, "max_count", Presence::Required, Check::Number { min: 0.0, max: 1000.0 }, report);
        Self::attr(pool, path, "min_count", Presence::Required, Check::Number { min: 0.0, max: 1000.0 }, report);

        let min = pool.attribute("min_count").and_then(|v| v.as_number().ok());
        let max = pool.attribute("max_count").and_then(|v| v.as_number().ok());
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            report.add_error(
                pool.position.clone(),
                path,
                "min_count",
                format!(
                    "min_count ({}) cannot be greater than max_count ({})",
                    format_number(min),
                    format_number(max)
                ),
            );
        }
    }

    fn validate_policies(block: &Block, parent: &str, report: &mut ValidationReport) {
        let path = child_path(parent, block);
        let rules: Vec<&Block> = block.blocks_of("rule").collect();
        if rules.is_empty() {
            report.add_error(
                block.position.clone(),
                &path,
                "rules",
                "policies block must contain at least one rule",
            );
        }

        for rule in rules {
            if rule.labels.len() != 1 {
                report.add_error(
                    rule.position.clone(),
                    &path,
                    "labels",
                    "rule block must have exactly one label (the rule name)",
                );
                continue;
            }
            let rule_path = format!("{path}.{}", rule.labels[0]);
            Self::attr(rule, &rule_path, "condition", Presence::Required, Check::String, report);
            Self::attr(rule, &rule_path, "action", Presence::Required, Check::OneOf(POLICY_ACTIONS), report);
        }
    }

    fn validate_mothergoose(block: &Block, report: &mut ValidationReport) {
        let path = String::from("mothergoose");
        Self::forbid_labels(block, &path, report);
        for section in MOTHERGOOSE_SECTIONS {
            Self::require_block(block, &path, section, report);
        }
    }

    // ------------------------------------------------------------------
    // Shared checks
    // ------------------------------------------------------------------

    /// Checks the single name label; returns the block path on success.
    fn named(block: &Block, kind: &str, what: &str, report: &mut ValidationReport) -> Option<String> {
        if block.labels.len() != 1 {
            report.add_error(
                block.position.clone(),
                kind,
                "labels",
                format!("{kind} block must have exactly one label (the {what})"),
            );
            return None;
        }

        let name = &block.labels[0];
        if !is_identifier(name) {
            report.add_error(
                block.position.clone(),
                kind,
                "name",
                format!(
                    "invalid {what} \"{name}\": must start with a letter and contain only alphanumeric characters, hyphens, and underscores"
                ),
            );
        }
        Some(format!("{kind}.{name}"))
    }

    fn forbid_labels(block: &Block, path: &str, report: &mut ValidationReport) {
        if !block.labels.is_empty() {
            report.add_error(
                block.position.clone(),
                path,
                "labels",
                format!("{} block should not have labels", block.block_type),
            );
        }
    }

    fn require_block(block: &Block, path: &str, child: &str, report: &mut ValidationReport) {
        if block.block(child).is_none() {
            report.add_error(
                block.position.clone(),
                path,
                child,
                format!("{} block must have a '{child}' nested block", block.block_type),
            );
        }
    }

    fn attr(
        block: &Block,
        path: &str,
        name: &str,
        presence: Presence,
        check: Check,
        report: &mut ValidationReport,
    ) {
        match block.attribute(name) {
            Some(value) => Self::check_value(value, path, name, check, report),
            None if presence == Presence::Required => report.add_error(
                block.position.clone(),
                path,
                name,
                format!("{} block must have a '{name}' attribute", block.block_type),
            ),
            None => {}
        }
    }

    fn check_value(value: &Value, path: &str, field: &str, check: Check, report: &mut ValidationReport) {
        match check {
            Check::String => {
                Self::expect_str(value, path, field, report);
            }
            Check::OneOf(allowed) => {
                if let Some(s) = Self::expect_str(value, path, field, report)
                    && !allowed.contains(&s)
                {
                    report.add_error(
                        value.position.clone(),
                        path,
                        field,
                        format!("{field} must be one of {}, got \"{s}\"", allowed.join("|")),
                    );
                }
            }
            Check::Number { min, max } => {
                Self::expect_range(value, path, field, min, max, report);
            }
            Check::WholeNumber { min, max } => {
                if let Some(n) = Self::expect_range(value, path, field, min, max, report)
                    && n.fract() != 0.0
                {
                    report.add_error(
                        value.position.clone(),
                        path,
                        field,
                        format!("{field} must be a whole number, got {}", format_number(n)),
                    );
                }
            }
            Check::StringList => {
                if let Some(items) = Self::expect_list(value, path, field, report) {
                    for (i, item) in items.iter().enumerate() {
                        Self::expect_str(item, path, &format!("{field}[{i}]"), report);
                    }
                }
            }
            Check::IdentifierList => {
                let Some(items) = Self::expect_list(value, path, field, report) else {
                    return;
                };
                if items.is_empty() {
                    report.add_error(
                        value.position.clone(),
                        path,
                        field,
                        format!("{field} must contain at least one egg name"),
                    );
                }
                for (i, item) in items.iter().enumerate() {
                    let item_field = format!("{field}[{i}]");
                    if let Some(s) = Self::expect_str(item, path, &item_field, report)
                        && !is_identifier(s)
                    {
                        report.add_error(
                            item.position.clone(),
                            path,
                            item_field,
                            format!(
                                "invalid egg name \"{s}\": must start with a letter and contain only alphanumeric characters, hyphens, and underscores"
                            ),
                        );
                    }
                }
            }
            Check::Duration => {
                if let Some(s) = Self::expect_str(value, path, field, report)
                    && let Err(e) = parse_duration(s)
                {
                    report.add_error(
                        value.position.clone(),
                        path,
                        field,
                        format!("{field} must be a duration such as \"30s\" or \"1h30m\": {}", e.reason),
                    );
                }
            }
            Check::Cron => {
                if let Some(s) = Self::expect_str(value, path, field, report)
                    && !is_cron_expression(s)
                {
                    report.add_error(
                        value.position.clone(),
                        path,
                        field,
                        format!("invalid cron expression: \"{s}\" (expected 5 or 6 fields)"),
                    );
                }
            }
        }
    }

    fn expect_str<'v>(
        value: &'v Value,
        path: &str,
        field: &str,
        report: &mut ValidationReport,
    ) -> Option<&'v str> {
        match value.as_str() {
            Ok(s) => Some(s),
            Err(e) => {
                report.add_error(
                    e.position,
                    path,
                    field,
                    format!("{field} must be a {}, got {}", e.expected, e.actual),
                );
                None
            }
        }
    }

    fn expect_list<'v>(
        value: &'v Value,
        path: &str,
        field: &str,
        report: &mut ValidationReport,
    ) -> Option<&'v [Value]> {
        match value.as_list() {
            Ok(items) => Some(items),
            Err(e) => {
                report.add_error(
                    e.position,
                    path,
                    field,
                    format!("{field} must be a {}, got {}", e.expected, e.actual),
                );
                None
            }
        }
    }

    fn expect_range(
        value: &Value,
        path: &str,
        field: &str,
        min: f64,
        max: f64,
        report: &mut ValidationReport,
    ) -> Option<f64> {
        let n = match value.as_number() {
            Ok(n) => n,
            Err(e) => {
                report.add_error(
                    e.position,
                    path,
                    field,
                    format!("{field} must be a {}, got {}", e.expected, e.actual),
                );
                return None;
            }
        };

        if n < min || n > max {
            report.add_error(
                value.position.clone(),
                path,
                field,
                format!(
                    "{field} must be between {} and {}, got {}",
                    format_number(min),
                    format_number(max),
                    format_number(n)
                ),
            );
        }
        Some(n)
    }
}

fn child_path(parent: &str, block: &Block) -> String {
    format!("{parent}.{}", block.block_type)
}
