//! Deployment plan types and construction.
//!
//! A plan records one intended change to an egg: the hash of the config it
//! deploys, when it was made, and what happened to it since. Plans are
//! produced by the deploy workflow and stored by `MotherGoose`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CloudConfig, CloudProvider, ConfigHasher, EggConfig, ResourceConfig, RunnerKind};

/// What a plan changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// Runner infrastructure for an egg.
    #[default]
    Runner,
    /// Shared network infrastructure.
    Rift,
}

/// Lifecycle state of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, not yet applied.
    #[default]
    Pending,
    /// Applied successfully.
    Applied,
    /// Superseded by a rollback.
    RolledBack,
    /// Application failed.
    Failed,
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runner => write!(f, "runner"),
            Self::Rift => write!(f, "rift"),
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A deployment plan as exchanged with `MotherGoose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Plan identifier (UUID v4).
    pub id: String,
    /// Egg the plan belongs to.
    pub egg_name: String,
    /// What the plan changes.
    #[serde(default)]
    pub plan_type: PlanType,
    /// Hash of the deployed egg configuration.
    pub config_hash: String,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the plan was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// Lifecycle state.
    #[serde(default)]
    pub status: PlanStatus,
    /// Plan this one rolls back to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_plan: Option<String>,
    /// Free-form details.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Opaque plan payload, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_blob: Option<String>,
}

/// Summary of an egg captured in the plan blob.
#[derive(Debug, Serialize)]
struct PlanSummary<'a> {
    egg_name: &'a str,
    runner_type: RunnerKind,
    cloud: &'a CloudConfig,
    resources: &'a ResourceConfig,
    timestamp: i64,
}

impl DeploymentPlan {
    /// Creates a pending runner plan for an egg.
    ///
    /// `cloud` and `region` are the deployment target chosen on the command
    /// line and are recorded in the metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan summary cannot be serialized.
    pub fn for_egg(
        egg: &EggConfig,
        config_hash: &str,
        cloud: CloudProvider,
        region: &str,
    ) -> serde_json::Result<Self> {
        let created_at = Utc::now();

        let summary = PlanSummary {
            egg_name: &egg.name,
            runner_type: egg.runner_type,
            cloud: &egg.cloud,
            resources: &egg.resources,
            timestamp: created_at.timestamp(),
        };
        let blob = ConfigHasher::new().canonical_json(&summary)?;

        let mut metadata = BTreeMap::new();
        metadata.insert(String::from("runner_type"), egg.runner_type.as_str().into());
        metadata.insert(String::from("cloud"), cloud.as_str().into());
        metadata.insert(String::from("region"), region.into());

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            egg_name: egg.name.clone(),
            plan_type: PlanType::Runner,
            config_hash: config_hash.to_string(),
            created_at,
            applied_at: None,
            status: PlanStatus::Pending,
            rollback_plan: None,
            metadata,
            plan_blob: Some(hex::encode(blob)),
        })
    }

    /// Returns the first 8 characters of the plan ID.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    /// Returns `true` if the plan was applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.status == PlanStatus::Applied
    }

    /// Decodes the plan blob back to its JSON summary.
    #[must_use]
    pub fn summary(&self) -> Option<serde_json::Value> {
        let bytes = hex::decode(self.plan_blob.as_deref()?).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} plan {} for {} ({}, created {})",
            self.plan_type,
            self.short_id(),
            self.egg_name,
            self.status,
            self.created_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::egg_from_block;
    use crate::fly::FlyParser;
    use crate::fly::fixtures::CANONICAL_EGG;

    fn sample_egg() -> EggConfig {
        let config = FlyParser::parse_str(CANONICAL_EGG, "t.fly").unwrap();
        egg_from_block(&config.blocks[0]).unwrap()
    }

    #[test]
    fn test_plan_for_egg() {
        let plan = DeploymentPlan::for_egg(&sample_egg(), "abc", CloudProvider::Yandex, "ru-central1-b").unwrap();

        assert_eq!(plan.egg_name, "my-app");
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.plan_type, PlanType::Runner);
        assert!(uuid::Uuid::parse_str(&plan.id).is_ok());
        assert_eq!(plan.metadata["runner_type"], "vm");
        assert_eq!(plan.metadata["cloud"], "yandex");
        assert_eq!(plan.metadata["region"], "ru-central1-b");
        assert_eq!(plan.short_id().len(), 8);

        let summary = plan.summary().unwrap();
        assert_eq!(summary["egg_name"], "my-app");
        assert_eq!(summary["resources"]["cpu"], 2);
        assert_eq!(summary["cloud"]["region"], "ru-central1-a");
    }

    #[test]
    fn test_fresh_plans_have_distinct_ids() {
        let egg = sample_egg();
        let a = DeploymentPlan::for_egg(&egg, "h", CloudProvider::Aws, "us-east-1").unwrap();
        let b = DeploymentPlan::for_egg(&egg, "h", CloudProvider::Aws, "us-east-1").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::json!({
            "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "egg_name": "my-app",
            "plan_type": "runner",
            "config_hash": "abc",
            "created_at": "2024-05-01T10:00:00Z",
            "applied_at": null,
            "status": "rolled_back",
            "metadata": {"cloud": "aws"}
        });
        let plan: DeploymentPlan = serde_json::from_value(json).unwrap();
        assert_eq!(plan.status, PlanStatus::RolledBack);
        assert_eq!(plan.applied_at, None);
        assert!(!plan.is_applied());

        let back = serde_json::to_value(&plan).unwrap();
        assert_eq!(back["status"], "rolled_back");
        assert!(back.get("plan_blob").is_none());
    }
}
