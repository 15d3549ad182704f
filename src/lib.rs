// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Gosling
//!
//! Command-line companion to the `MotherGoose` orchestrator: parses, validates
//! and deploys `GitLab` runner fleet configuration written in the Fly language.
//!
//! ## Overview
//!
//! A Gosling repository (a "nest") keeps its configuration in three
//! directories:
//!
//! - `Eggs/<name>/config.fly`: one egg (runner group) or eggs bucket
//! - `Jobs/<name>.fly`: scheduled jobs
//! - `UF/config.fly`: `UglyFox` runner pruning policy
//!
//! ## Pipeline
//!
//! 1. **Parse**: Fly source becomes a positioned AST
//! 2. **Validate**: the AST is checked against the block schemas
//! 3. **Convert**: egg blocks become typed domain records
//! 4. **Hash**: the canonical JSON of a record identifies its configuration
//! 5. **Deploy**: changed eggs are planned and submitted to `MotherGoose`
//!
//! ## Modules
//!
//! - [`fly`]: Fly lexer, parser, printer, JSON projection and validator
//! - [`config`]: Domain records, conversion, cloud rules and hashing
//! - [`mothergoose`]: `MotherGoose` API client with retry and cancellation
//! - [`planner`]: Deployment plans and rollback target selection
//! - [`deploy`]: Deploy, rollback and status workflows
//! - [`nest`]: Repository layout and scaffolding
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! egg "my-app" {
//!   type = "vm"
//!
//!   cloud {
//!     provider = "yandex"
//!     region   = "ru-central1-a"
//!   }
//!
//!   resources {
//!     cpu    = 2
//!     memory = 4096
//!     disk   = 20
//!   }
//!
//!   runner {
//!     tags       = ["docker"]
//!     concurrent = 3
//!   }
//!
//!   gitlab {
//!     project_id   = 12345
//!     server_name  = "gitlab.com"
//!     token_secret = "yc-lockbox://gitlab/runner-token"
//!   }
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fly;
pub mod mothergoose;
pub mod nest;
pub mod planner;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, EggConfig, EggsBucketConfig};
pub use deploy::{DeployOptions, DeployReport, DeployWorkflow};
pub use error::{GoslingError, Result};
pub use fly::{Config, FlyParser, FlyValidator, ValidationReport};
pub use mothergoose::{MotherGooseApi, MotherGooseClient, OperationContext};
pub use planner::{DeploymentPlan, select_rollback_target};
