//! Deploy, rollback and status workflows.
//!
//! The deploy workflow walks `Eggs/*/config.fly` in a fixed order. For each
//! egg it parses, validates, converts and hashes the configuration, then
//! compares the hash with the latest plan `MotherGoose` holds. Unchanged eggs
//! are skipped; changed eggs get a fresh plan and are submitted.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{CloudProvider, ConfigHasher, EggConfig, egg_to_target, eggs_from_config};
use crate::error::{DeployError, GoslingError, Result};
use crate::fly::{FlyParser, FlyValidator};
use crate::mothergoose::{EggStatus, MotherGooseApi, OperationContext};
use crate::nest;
use crate::planner::{DeploymentPlan, select_rollback_target};

/// Options for one deploy run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Target cloud provider, recorded in plan metadata.
    pub cloud: CloudProvider,
    /// Target region, recorded in plan metadata.
    pub region: String,
    /// Plan only; never write to `MotherGoose`.
    pub dry_run: bool,
    /// Record failures and keep going instead of stopping at the first one.
    pub continue_on_error: bool,
}

/// What happened to one egg.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EggOutcome {
    /// The latest plan already has this config hash.
    Unchanged {
        /// Current config hash.
        config_hash: String,
    },
    /// Dry run: a plan was built but nothing was submitted.
    Planned {
        /// The plan that would be submitted.
        plan: DeploymentPlan,
    },
    /// The egg configuration was submitted.
    Submitted {
        /// The plan built for the submission.
        plan: DeploymentPlan,
    },
    /// The egg failed; only recorded with `continue_on_error`.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Outcome for one egg, with the file it came from.
#[derive(Debug, Clone, Serialize)]
pub struct EggDeployment {
    /// Egg name.
    pub egg: String,
    /// Configuration file.
    pub source: PathBuf,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: EggOutcome,
}

/// Result of a deploy run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// Per-egg outcomes in processing order.
    pub eggs: Vec<EggDeployment>,
}

impl DeployReport {
    /// Number of eggs skipped as unchanged.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.count(|o| matches!(o, EggOutcome::Unchanged { .. }))
    }

    /// Number of eggs planned or submitted.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.count(|o| matches!(o, EggOutcome::Planned { .. } | EggOutcome::Submitted { .. }))
    }

    /// Number of failed eggs.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, EggOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&EggOutcome) -> bool) -> usize {
        self.eggs.iter().filter(|e| predicate(&e.outcome)).count()
    }

    /// Turns recorded failures into an error.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::BatchFailed`] if any egg failed.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed_count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(DeployError::BatchFailed {
                failed,
                total: self.eggs.len(),
            }
            .into())
        }
    }
}

/// Deploys every egg of a repository through a [`MotherGooseApi`].
pub struct DeployWorkflow<'a, A: MotherGooseApi + ?Sized> {
    /// API used for status reads and submissions.
    api: &'a A,
    /// Run options.
    options: DeployOptions,
    /// Configuration hasher.
    hasher: ConfigHasher,
    /// Validation gate.
    validator: FlyValidator,
}

impl<'a, A: MotherGooseApi + ?Sized> DeployWorkflow<'a, A> {
    /// Creates a workflow.
    #[must_use]
    pub const fn new(api: &'a A, options: DeployOptions) -> Self {
        Self {
            api,
            options,
            hasher: ConfigHasher::new(),
            validator: FlyValidator::new(),
        }
    }

    /// Parses, validates and converts one egg configuration file.
    ///
    /// A bucket yields one egg per repository. Every egg is also checked
    /// against the cloud rules of its runner kind.
    ///
    /// # Errors
    ///
    /// Returns the parse error, the validation report, or the first
    /// conversion error.
    pub fn load_egg_file(&self, path: &Path) -> Result<Vec<EggConfig>> {
        let config = FlyParser::parse_file(path)?;
        self.validator.validate(&config).into_result()?;

        let eggs = eggs_from_config(&config)?;
        for egg in &eggs {
            egg_to_target(egg)?;
        }

        debug!("Loaded {} egg(s) from {}", eggs.len(), path.display());
        Ok(eggs)
    }

    /// Runs the workflow over the repository at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository holds no eggs, on cancellation, or
    /// on the first failing egg unless `continue_on_error` is set.
    pub async fn run(&self, ctx: &OperationContext, root: &Path) -> Result<DeployReport> {
        let files = nest::egg_config_files(root)?;
        if files.is_empty() {
            return Err(DeployError::NoEggs {
                root: root.to_path_buf(),
            }
            .into());
        }
        info!("Found {} egg configuration(s)", files.len());

        let mut report = DeployReport {
            dry_run: self.options.dry_run,
            eggs: Vec::new(),
        };

        for path in files {
            match self.load_egg_file(&path) {
                Ok(eggs) => {
                    for egg in eggs {
                        info!("Deploying egg {}", egg.name);
                        let outcome = self.deploy_egg(ctx, &egg).await;
                        self.record(&mut report, egg.name, &path, outcome)?;
                    }
                }
                Err(e) => {
                    let name = directory_name(&path);
                    self.record(&mut report, name, &path, Err(e))?;
                }
            }
        }

        info!(
            "Deploy finished: {} changed, {} unchanged, {} failed",
            report.changed_count(),
            report.unchanged_count(),
            report.failed_count()
        );
        Ok(report)
    }

    fn record(
        &self,
        report: &mut DeployReport,
        egg: String,
        source: &Path,
        outcome: Result<EggOutcome>,
    ) -> Result<()> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(GoslingError::Api(e)) if e.is_cancelled() => return Err(e.into()),
            Err(e) if self.options.continue_on_error => {
                error!("Egg {egg} failed: {e}");
                EggOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => return Err(DeployError::egg_failed(egg, e).into()),
        };

        report.eggs.push(EggDeployment {
            egg,
            source: source.to_path_buf(),
            outcome,
        });
        Ok(())
    }

    /// Deploys one converted egg.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails, the status read fails with anything
    /// but `404`, or the submission fails.
    pub async fn deploy_egg(&self, ctx: &OperationContext, egg: &EggConfig) -> Result<EggOutcome> {
        let config_hash = self.hasher.hash(egg)?;
        debug!("Config hash for {}: {}", egg.name, self.hasher.short_hash(&config_hash));

        match self.api.get_egg_status(ctx, &egg.name).await {
            Ok(status) if status.is_current(&config_hash) => {
                info!("No changes detected for {}", egg.name);
                return Ok(EggOutcome::Unchanged { config_hash });
            }
            Ok(_) => debug!("Egg {} changed since its latest plan", egg.name),
            Err(e) if e.is_not_found() => debug!("Egg {} was never deployed", egg.name),
            Err(e) => return Err(e.into()),
        }

        let plan = DeploymentPlan::for_egg(egg, &config_hash, self.options.cloud, &self.options.region)?;

        if self.options.dry_run {
            info!("Dry run: planned {} for {}", plan.short_id(), egg.name);
            return Ok(EggOutcome::Planned { plan });
        }

        self.api.create_or_update_egg(ctx, egg).await?;
        info!("Stored egg configuration {} (plan {})", egg.name, plan.short_id());
        Ok(EggOutcome::Submitted { plan })
    }
}

fn directory_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

// ============================================================================
// Rollback
// ============================================================================

/// The plans involved in a rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackPlan {
    /// Egg being rolled back.
    pub egg: String,
    /// Plan currently deployed.
    pub current: DeploymentPlan,
    /// Plan to return to.
    pub target: DeploymentPlan,
}

/// Resolves the rollback target of an egg.
///
/// With `to`, the named plan is fetched. Otherwise the most recently applied
/// plan other than the current one is taken from the egg's history.
///
/// # Errors
///
/// Returns an error if the egg was never deployed, no earlier applied plan
/// exists, or an API call fails.
pub async fn resolve_rollback<A: MotherGooseApi + ?Sized>(
    api: &A,
    ctx: &OperationContext,
    egg: &str,
    to: Option<&str>,
) -> Result<RollbackPlan> {
    let status = api.get_egg_status(ctx, egg).await?;
    let current = status.latest_plan.clone().ok_or_else(|| DeployError::NotDeployed {
        egg: egg.to_string(),
    })?;

    let target = match to {
        Some(plan_id) => api.get_deployment_plan(ctx, egg, plan_id).await?,
        None => select_rollback_target(&status.deployment_history, &current.id)
            .cloned()
            .ok_or_else(|| DeployError::NoRollbackTarget {
                egg: egg.to_string(),
            })?,
    };

    info!("Rollback of {egg}: {} -> {}", current.short_id(), target.short_id());
    Ok(RollbackPlan {
        egg: egg.to_string(),
        current,
        target,
    })
}

// ============================================================================
// Status
// ============================================================================

/// Status of one egg as listed by `status --all`.
#[derive(Debug, Clone, Serialize)]
pub struct EggSummary {
    /// Egg name.
    pub egg: String,
    /// Status, or `None` if it could not be read.
    pub status: Option<EggStatus>,
}

/// Lists every egg `MotherGoose` knows with its status.
///
/// Eggs whose status read fails are reported without a status.
///
/// # Errors
///
/// Returns an error if listing fails or the context is cancelled.
pub async fn collect_statuses<A: MotherGooseApi + ?Sized>(
    api: &A,
    ctx: &OperationContext,
) -> Result<Vec<EggSummary>> {
    let eggs = api.list_eggs(ctx).await?;
    let mut summaries = Vec::with_capacity(eggs.len());

    for egg in eggs {
        let status = match api.get_egg_status(ctx, &egg.name).await {
            Ok(status) => Some(status),
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                warn!("Could not read status of {}: {e}", egg.name);
                None
            }
        };
        summaries.push(EggSummary {
            egg: egg.name,
            status,
        });
    }

    Ok(summaries)
}
