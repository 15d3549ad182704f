//! `MotherGoose` API wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::planner::DeploymentPlan;

/// Deployment status of an egg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggStatus {
    /// Egg name.
    pub egg_name: String,
    /// Most recent plan, if the egg was ever deployed.
    #[serde(default)]
    pub latest_plan: Option<DeploymentPlan>,
    /// Every plan for the egg, oldest first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deployment_history: Vec<DeploymentPlan>,
    /// Runners currently registered for the egg.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub active_runners: Vec<Runner>,
    /// Hash of the configuration `MotherGoose` currently holds.
    #[serde(default)]
    pub config_hash: String,
}

/// A runner instance managed by `MotherGoose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    /// Runner identifier.
    pub id: String,
    /// Owning egg.
    pub egg_name: String,
    /// Runner kind (`vm` or `serverless`).
    #[serde(rename = "type")]
    pub runner_type: String,
    /// Lifecycle state, e.g. `active` or `dormant`.
    pub state: String,
    /// Cloud provider hosting the runner.
    pub cloud_provider: String,
    /// Region hosting the runner.
    pub region: String,
    /// When the runner was created.
    pub created_at: DateTime<Utc>,
    /// Last heartbeat received.
    pub last_heartbeat: DateTime<Utc>,
}

impl EggStatus {
    /// Returns `true` if the latest plan was made from a config with `hash`.
    #[must_use]
    pub fn is_current(&self, hash: &str) -> bool {
        self.latest_plan
            .as_ref()
            .is_some_and(|plan| plan.config_hash == hash)
    }
}

// The orchestrator encodes empty lists as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_with_nulls() {
        let json = r#"{
            "egg_name": "my-app",
            "latest_plan": null,
            "deployment_history": null,
            "active_runners": null,
            "config_hash": ""
        }"#;
        let status: EggStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.egg_name, "my-app");
        assert!(status.latest_plan.is_none());
        assert!(status.deployment_history.is_empty());
        assert!(status.active_runners.is_empty());
        assert!(!status.is_current(""));
    }

    #[test]
    fn test_status_with_runner_and_plan() {
        let json = r#"{
            "egg_name": "my-app",
            "latest_plan": {
                "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                "egg_name": "my-app",
                "plan_type": "runner",
                "config_hash": "abc",
                "created_at": "2024-05-01T10:00:00Z",
                "status": "applied",
                "metadata": {}
            },
            "active_runners": [{
                "id": "r-1",
                "egg_name": "my-app",
                "type": "vm",
                "state": "active",
                "cloud_provider": "yandex",
                "region": "ru-central1-a",
                "created_at": "2024-05-01T10:00:00Z",
                "last_heartbeat": "2024-05-01T10:05:00Z"
            }],
            "config_hash": "abc"
        }"#;
        let status: EggStatus = serde_json::from_str(json).unwrap();
        assert!(status.is_current("abc"));
        assert!(!status.is_current("abd"));
        assert_eq!(status.active_runners[0].runner_type, "vm");
        assert!(status.deployment_history.is_empty());
    }
}
