//! `MotherGoose` API integration module.
//!
//! This module provides everything needed to talk to the `MotherGoose`
//! orchestrator: the operation context, wire types, the abstract operation
//! set, and the retrying HTTP client.

mod api;
mod client;
mod context;
mod types;

pub use api::MotherGooseApi;
#[cfg(test)]
pub use api::MockMotherGooseApi;
pub use client::{
    DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, MotherGooseClient,
    MotherGooseClientBuilder,
};
pub use context::{CancelCause, OperationContext};
pub use types::{EggStatus, Runner};
