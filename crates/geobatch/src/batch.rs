//! Splitting the address list into request-sized batches

use crate::ingest::AddressRecord;
use std::num::NonZeroUsize;

/// A contiguous run of addresses sent to the geocoding service in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in emission order, starting at 0
    pub index: usize,
    pub records: Vec<AddressRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition `records` into consecutive batches of at most `size` records.
///
/// Concatenating the batches in order reproduces `records` exactly. Only the
/// last batch may be shorter than `size`, and an empty input produces no
/// batches at all.
pub fn partition(records: Vec<AddressRecord>, size: NonZeroUsize) -> Vec<Batch> {
    let size = size.get();
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut records = records.into_iter().peekable();

    while records.peek().is_some() {
        let chunk: Vec<AddressRecord> = records.by_ref().take(size).collect();
        batches.push(Batch {
            index: batches.len(),
            records: chunk,
        });
    }

    batches
}
