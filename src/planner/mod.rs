//! Planning module for deployment operations.
//!
//! This module builds the deployment plans submitted for changed eggs and
//! chooses rollback targets from an egg's plan history.

mod plan;
mod rollback;

pub use plan::{DeploymentPlan, PlanStatus, PlanType};
pub use rollback::select_rollback_target;
