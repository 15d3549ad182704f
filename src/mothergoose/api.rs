//! The operation set the CLI consumes from `MotherGoose`.

use async_trait::async_trait;

use crate::config::EggConfig;
use crate::error::ApiError;
use crate::planner::DeploymentPlan;

use super::context::OperationContext;
use super::types::EggStatus;

/// `MotherGoose` API operations.
///
/// [`MotherGooseClient`](super::MotherGooseClient) implements this over HTTP;
/// the deploy workflow only depends on the trait so tests can substitute it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MotherGooseApi: Send + Sync {
    /// Reads the deployment status of an egg.
    async fn get_egg_status(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
    ) -> Result<EggStatus, ApiError>;

    /// Lists every egg configuration `MotherGoose` knows.
    async fn list_eggs(&self, ctx: &OperationContext) -> Result<Vec<EggConfig>, ApiError>;

    /// Stores an egg configuration, creating or replacing it.
    async fn create_or_update_egg(
        &self,
        ctx: &OperationContext,
        egg: &EggConfig,
    ) -> Result<(), ApiError>;

    /// Reads one deployment plan.
    async fn get_deployment_plan(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
        plan_id: &str,
    ) -> Result<DeploymentPlan, ApiError>;

    /// Lists every deployment plan of an egg.
    async fn list_deployment_plans(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
    ) -> Result<Vec<DeploymentPlan>, ApiError>;
}
