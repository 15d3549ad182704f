//! Rollback target selection.

use super::plan::DeploymentPlan;

/// Picks the plan to roll back to.
///
/// The target is the applied plan with the latest `applied_at`, ignoring
/// `current_id`. Applied plans without a timestamp rank below any that have
/// one.
#[must_use]
pub fn select_rollback_target<'a>(
    history: &'a [DeploymentPlan],
    current_id: &str,
) -> Option<&'a DeploymentPlan> {
    history
        .iter()
        .filter(|plan| plan.id != current_id && plan.is_applied())
        .fold(None, |best: Option<&DeploymentPlan>, plan| match best {
            Some(b) if b.applied_at >= plan.applied_at => Some(b),
            _ => Some(plan),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{PlanStatus, PlanType};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn plan(id: &str, status: PlanStatus, applied_hour: Option<u32>) -> DeploymentPlan {
        DeploymentPlan {
            id: id.to_string(),
            egg_name: String::from("my-app"),
            plan_type: PlanType::Runner,
            config_hash: format!("hash-{id}"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            applied_at: applied_hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
            status,
            rollback_plan: None,
            metadata: BTreeMap::new(),
            plan_blob: None,
        }
    }

    #[test]
    fn test_picks_latest_applied_other_than_current() {
        let history = vec![
            plan("p1", PlanStatus::Applied, Some(1)),
            plan("p2", PlanStatus::Applied, Some(3)),
            plan("p3", PlanStatus::Failed, Some(4)),
            plan("p4", PlanStatus::Applied, Some(5)),
        ];

        assert_eq!(select_rollback_target(&history, "p4").map(|p| p.id.as_str()), Some("p2"));
        assert_eq!(select_rollback_target(&history, "p0").map(|p| p.id.as_str()), Some("p4"));
    }

    #[test]
    fn test_no_target() {
        let history = vec![
            plan("p1", PlanStatus::Applied, Some(1)),
            plan("p2", PlanStatus::Pending, None),
            plan("p3", PlanStatus::RolledBack, Some(2)),
        ];
        assert!(select_rollback_target(&history, "p1").is_none());
        assert!(select_rollback_target(&[], "p1").is_none());
    }

    #[test]
    fn test_untimed_applied_plan_ranks_last() {
        let history = vec![
            plan("p1", PlanStatus::Applied, None),
            plan("p2", PlanStatus::Applied, Some(2)),
        ];
        assert_eq!(select_rollback_target(&history, "x").map(|p| p.id.as_str()), Some("p2"));
    }
}
