//! Buffer Stats Counters
//!
//! A fixed set of monotonically increasing counters observable by the
//! service. Consumers never see placeholders for lost data in the packet
//! stream; overwrites, malformed chunks and dropped fragments surface here
//! instead.
//!
//! All counters are plain `u64` fields — the buffer is owned by a single
//! task, so no atomics are involved, and 64 bits do not wrap under any
//! realistic workload. `snapshot()` is just a copy.

/// Counters maintained by the trace buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// DATA chunks accepted by `append_chunk`.
    pub chunks_written: u64,
    /// Payload bytes accepted (before alignment rounding).
    pub bytes_written: u64,
    /// Chunks whose index entry was destroyed, either clobbered by the
    /// ring cursor or displaced by a duplicate id.
    pub chunks_overwritten: u64,
    /// Record bytes reclaimed from overwritten chunks.
    pub bytes_overwritten: u64,
    /// Duplicate-id submissions: an existing (producer, writer, chunk) was
    /// replaced by a newer record.
    pub chunks_rewritten: u64,
    /// Chunks abandoned by the reader because of invalid packet framing.
    pub chunks_discarded_malformed: u64,
    /// Fragments skipped because their predecessor chunk was gone.
    pub fragments_dropped_orphan: u64,
    /// Fragment chains broken because a partially-read chunk was evicted.
    pub fragments_dropped_successor_overwritten: u64,
    /// Bytes sealed into PADDING records at the pre-wrap tail.
    pub padding_bytes_written: u64,
    /// Out-of-band patches applied.
    pub patches_applied: u64,
    /// Out-of-band patches rejected (absent chunk or bad offset).
    pub patches_rejected: u64,
    /// Fragment chains successfully stitched across chunks.
    pub readaheads_succeeded: u64,
    /// Stitching attempts abandoned on a gap, a flag mismatch or corruption.
    pub readaheads_failed: u64,
}

impl BufferStats {
    /// Copy of the counters at this instant.
    pub fn snapshot(&self) -> BufferStats {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_zero() {
        let stats = BufferStats::default();
        assert_eq!(stats.chunks_written, 0);
        assert_eq!(stats.patches_rejected, 0);
        assert_eq!(stats, BufferStats::default());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut stats = BufferStats::default();
        let before = stats.snapshot();
        stats.chunks_written += 1;
        assert_eq!(before.chunks_written, 0);
        assert_eq!(stats.chunks_written, 1);
    }
}
