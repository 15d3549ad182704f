//! Domain configuration for Gosling.
//!
//! This module handles everything between a validated Fly tree and the wire:
//! - Strongly typed domain records (eggs, buckets, VM and serverless targets)
//! - The duration-string grammar shared with the orchestrator
//! - Conversion with cloud-provider rules
//! - Computing configuration hashes for change detection

mod convert;
mod duration;
mod hash;
mod spec;

pub use convert::{
    AWS_LAMBDA_MEMORY, AWS_REGIONS, SERVERLESS_TIMEOUT, YANDEX_SERVERLESS_MEMORY, YANDEX_ZONES,
    bucket_from_block, check_serverless_rules, check_vm_rules, egg_from_block,
    egg_to_serverless, egg_to_target, egg_to_vm, eggs_from_config,
};
pub use duration::{DurationError, format_duration, nanos, option_nanos, parse_duration};
pub use hash::ConfigHasher;
pub use spec::{
    CloudConfig, CloudProvider, DeploymentTarget, EggConfig, EggsBucketConfig, GitLabConfig,
    Repository, ResourceConfig, RunnerConfig, RunnerKind, ServerlessConfig, VmConfig,
};
