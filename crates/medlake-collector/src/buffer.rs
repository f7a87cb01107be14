use std::collections::BTreeMap;

use chrono::NaiveDate;
use medlake_core::ChannelMessage;

/// Per-channel accumulator grouping records by their partition date.
///
/// Scoped to one channel's collection and consumed by the flush; records keep
/// the order in which they were pushed.
#[derive(Debug, Default)]
pub struct DateBuffer {
    partitions: BTreeMap<NaiveDate, Vec<ChannelMessage>>,
}

impl DateBuffer {
    pub fn push(&mut self, record: ChannelMessage) {
        self.partitions
            .entry(record.partition_date())
            .or_default()
            .push(record);
    }

    /// Number of buffered records across all dates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Distinct dates observed, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.partitions.keys().copied()
    }

    pub fn into_partitions(self) -> impl Iterator<Item = (NaiveDate, Vec<ChannelMessage>)> {
        self.partitions.into_iter()
    }
}
