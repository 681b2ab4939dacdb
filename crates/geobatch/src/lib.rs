//! geobatch library
//!
//! Batch geocoding of street addresses against an ArcGIS-style
//! `geocodeAddresses` service.
//!
//! # Pipeline
//!
//! - **Ingest**: read the address CSV into [`AddressRecord`]s
//! - **Batch**: split the records into fixed-size [`Batch`]es
//! - **Dispatch**: send batches through a bounded worker pool, persisting
//!   every raw response as an artifact
//! - **Aggregate**: flatten all artifacts into one CSV
//!
//! # Example
//!
//! ```no_run
//! use geobatch::{Config, Pipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let summary = Pipeline::new(&config)?.run(Path::new("addresses.csv")).await?;
//!     println!("{} rows in {}", summary.aggregate.rows, summary.aggregate.output.display());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod artifact;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod oracle;
pub mod pipeline;

// Re-export commonly used types
pub use aggregate::{AggregateSummary, Aggregator, AGGREGATE_FILE_NAME};
pub use artifact::{Artifact, ArtifactStore};
pub use batch::{partition, Batch};
pub use config::{Config, FailurePolicy};
pub use dispatch::{BatchFailure, DispatchReport, Dispatcher};
pub use error::{GeobatchError, Result};
pub use ingest::{read_addresses, AddressRecord};
pub use oracle::OracleClient;
pub use pipeline::{aggregate_dir, Pipeline, RunSummary};
