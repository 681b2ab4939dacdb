//! End-to-end geocoding pipeline
//!
//! Phases run strictly in sequence:
//!
//! 1. ingest the address CSV
//! 2. partition it into batches
//! 3. dispatch the batches to the worker pool (one artifact per batch)
//! 4. aggregate every artifact into `geocode_result.csv`
//!
//! Phases 1-3 are [`Pipeline::dispatch`]; phase 4 is [`Pipeline::aggregate`]
//! and can be run on its own against an existing artifact directory.

use crate::aggregate::{AggregateSummary, Aggregator};
use crate::artifact::ArtifactStore;
use crate::batch::partition;
use crate::config::Config;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{GeobatchError, Result};
use crate::ingest::read_addresses;
use crate::oracle::OracleClient;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Result of a full dispatch-then-aggregate run
#[derive(Debug)]
pub struct RunSummary {
    pub records: usize,
    pub dispatch: DispatchReport,
    pub aggregate: AggregateSummary,
}

impl RunSummary {
    /// True when every batch produced an artifact
    pub fn is_complete(&self) -> bool {
        self.dispatch.is_complete()
    }
}

/// Aggregate an existing artifact directory without geocoding anything.
///
/// Needs no service configuration, which makes it usable for re-flattening
/// the artifacts of an earlier run.
pub async fn aggregate_dir(dir: &Path) -> Result<AggregateSummary> {
    let aggregator = Aggregator::new(ArtifactStore::new(dir));
    tokio::task::spawn_blocking(move || aggregator.aggregate())
        .await
        .map_err(|e| GeobatchError::TaskPanicked(e.to_string()))?
}

pub struct Pipeline {
    chunk_size: NonZeroUsize,
    store: ArtifactStore,
    dispatcher: Dispatcher,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let store = ArtifactStore::new(config.output_dir.clone());
        let oracle = OracleClient::from_config(config)?;
        let dispatcher = Dispatcher::new(
            oracle,
            store.clone(),
            config.worker_count()?,
            config.failure_policy,
        );

        Ok(Self {
            chunk_size: config.chunk_size()?,
            store,
            dispatcher,
        })
    }

    /// Enable or disable the dispatch progress bar.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.dispatcher = self.dispatcher.with_progress(show);
        self
    }

    /// Ingest, partition and geocode `input`, persisting one artifact per batch.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn dispatch(&self, input: &Path) -> Result<DispatchReport> {
        let (_, report) = self.ingest_and_dispatch(input).await?;
        Ok(report)
    }

    /// Flatten every artifact in the output directory into the aggregated CSV.
    pub async fn aggregate(&self) -> Result<AggregateSummary> {
        aggregate_dir(self.store.dir()).await
    }

    /// Run every phase.
    ///
    /// Aggregation only starts after the dispatcher has returned. Under the
    /// isolate failure policy it still runs when some batches failed; the
    /// failures are reported in the summary.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn run(&self, input: &Path) -> Result<RunSummary> {
        let (records, dispatch) = self.ingest_and_dispatch(input).await?;

        if !dispatch.failures.is_empty() {
            warn!(
                failed = dispatch.failures.len(),
                batches = dispatch.batches,
                "Some batches failed; aggregating the rest"
            );
        }

        let aggregate = self.aggregate().await?;
        Ok(RunSummary {
            records,
            dispatch,
            aggregate,
        })
    }

    async fn ingest_and_dispatch(&self, input: &Path) -> Result<(usize, DispatchReport)> {
        // Input errors surface here, before any request is made
        let path = input.to_path_buf();
        let addresses = tokio::task::spawn_blocking(move || read_addresses(&path))
            .await
            .map_err(|e| GeobatchError::TaskPanicked(e.to_string()))??;

        let records = addresses.len();
        let batches = partition(addresses, self.chunk_size);
        info!(
            records,
            batches = batches.len(),
            batch_size = self.chunk_size.get(),
            "Partitioned addresses"
        );

        let report = self.dispatcher.dispatch(batches).await?;
        Ok((records, report))
    }
}
