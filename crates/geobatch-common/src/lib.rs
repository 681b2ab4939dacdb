//! geobatch common library
//!
//! Shared plumbing for the geobatch workspace:
//!
//! - **Logging**: one place that installs the `tracing` subscriber
//! - **Settings**: YAML file and environment variable helpers for layered config
//! - **Errors**: the error type those helpers return

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod settings;

pub use error::{CommonError, Result};
