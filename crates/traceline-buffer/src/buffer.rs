//! The Trace Buffer
//!
//! `TraceBuffer` ties the ring store, the chunk index and the stats counters
//! into the single object the service task owns. The write path
//! ([`TraceBuffer::append_chunk`]) and the patch path
//! ([`TraceBuffer::apply_patch`]) live here; the read path (packet
//! stitching) lives in the `reader` module as a second `impl` block.
//!
//! ## Consistency between store and index
//!
//! The store is the authoritative representation. Every mutation flows
//! store-first: an append asks the store for room, the store reports which
//! DATA records it destroyed, and only then is the index reconciled —
//! removing the victims and installing the new entry. The index is never
//! consulted to decide what the store contains.
//!
//! A victim's index entry is removed only when the entry still points at
//! the clobbered location. After a duplicate-id submission the index maps
//! the key to the *newer* record, and the stale bytes of the older one must
//! not take the live entry down with them when the cursor eventually rolls
//! over them.
//!
//! ## Trust model
//!
//! Producers are untrusted. Flags, packet counts and payload bytes are
//! stored verbatim and validated on the read path; identifiers are only
//! checked for duplicate submissions. CHECK-level anomalies log a warning
//! and trip a `debug_assert!` unless `set_suppress_sanity_checks(true)` —
//! release builds never abort on producer input.

use tracing::{debug, warn};

use traceline_core::ids::{ChunkId, ChunkKey, ProducerId, WriterId};
use traceline_core::Result;

use crate::index::{ChunkIndex, ChunkMeta};
use crate::record::{chunk_flags, RecordHeader};
use crate::stats::BufferStats;
use crate::store::ChunkStore;

/// Out-of-band patches always overwrite exactly this many bytes.
pub const PATCH_LEN: usize = 4;

/// Bounded-memory circular buffer of trace chunks with per-writer ordering,
/// packet stitching and out-of-band patching.
pub struct TraceBuffer {
    pub(crate) store: ChunkStore,
    pub(crate) index: ChunkIndex,
    pub(crate) stats: BufferStats,
    /// Position of the in-progress read pass; `None` when exhausted.
    pub(crate) read_pos: Option<ChunkKey>,
    pub(crate) suppress_sanity_checks: bool,
}

impl TraceBuffer {
    /// Create a buffer of `size_bytes` capacity (rounded up to a multiple
    /// of 16, minimum 4 KiB).
    pub fn new(size_bytes: usize) -> Result<Self> {
        Ok(Self {
            store: ChunkStore::new(size_bytes)?,
            index: ChunkIndex::new(),
            stats: BufferStats::default(),
            read_pos: None,
            suppress_sanity_checks: false,
        })
    }

    /// Total capacity in bytes after rounding.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Bytes between the write cursor and the end of the region.
    pub fn size_to_end(&self) -> usize {
        self.store.size_to_end()
    }

    /// Number of chunks currently readable.
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Snapshot of the stats counters.
    pub fn stats(&self) -> BufferStats {
        self.stats.snapshot()
    }

    /// Disable the CHECK-level anomaly diagnostics so adversarial inputs
    /// can be driven end-to-end (fuzzing, malicious-producer tests).
    pub fn set_suppress_sanity_checks(&mut self, suppress: bool) {
        self.suppress_sanity_checks = suppress;
    }

    /// True when the chunk is currently present (readable and patchable).
    pub fn contains_chunk(
        &self,
        producer_id: ProducerId,
        writer_id: WriterId,
        chunk_id: ChunkId,
    ) -> bool {
        self.index
            .get(&ChunkKey::new(producer_id, writer_id, chunk_id))
            .is_some()
    }

    /// Live chunk ids of one writer sequence, in stream order.
    pub fn sequence_chunk_ids(&self, producer_id: ProducerId, writer_id: WriterId) -> Vec<ChunkId> {
        self.index
            .sequence_keys(producer_id, writer_id)
            .into_iter()
            .map(|k| k.chunk_id)
            .collect()
    }

    /// Like [`Self::sequence_chunk_ids`], restricted to ids at or after
    /// `start` under modular ordering.
    pub fn sequence_chunk_ids_from(
        &self,
        producer_id: ProducerId,
        writer_id: WriterId,
        start: ChunkId,
    ) -> Vec<ChunkId> {
        self.index
            .sequence_keys(producer_id, writer_id)
            .into_iter()
            .map(|k| k.chunk_id)
            .filter(|&id| traceline_core::ids::chunk_id_distance(id, start) >= 0)
            .collect()
    }

    /// Commit one chunk into the buffer.
    ///
    /// Returns the bytes consumed by the record (header and 16-byte
    /// rounding included, pre-wrap tail padding excluded). Fails only when
    /// the record alone exceeds the buffer capacity or the buffer
    /// configuration was invalid; everything else is best-effort.
    pub fn append_chunk(
        &mut self,
        producer_id: ProducerId,
        writer_id: WriterId,
        chunk_id: ChunkId,
        flags: u8,
        num_packets: u16,
        payload: &[u8],
    ) -> Result<usize> {
        let key = ChunkKey::new(producer_id, writer_id, chunk_id);
        let flags = flags & chunk_flags::ALL;
        let record_size = ChunkStore::record_size_for(payload.len());
        let header = RecordHeader::data(record_size as u32, key, flags, num_packets);

        let outcome = self.store.append(header, payload)?;

        for victim in &outcome.evicted {
            let victim_key = victim.header.key();
            let live = self
                .index
                .get(&victim_key)
                .is_some_and(|meta| meta.store_offset == victim.offset);
            if !live {
                // Stale bytes of a record the index no longer points at
                // (displaced earlier by a duplicate id). Nothing to undo.
                continue;
            }
            let meta = self.index.remove(&victim_key);
            self.stats.chunks_overwritten += 1;
            self.stats.bytes_overwritten += u64::from(victim.header.size);
            if meta.is_some_and(|m| m.partially_read()) {
                self.stats.fragments_dropped_successor_overwritten += 1;
            }
            debug!(
                producer = victim_key.producer_id,
                writer = victim_key.writer_id,
                chunk = victim_key.chunk_id,
                "chunk evicted by wrap-around"
            );
        }
        self.stats.padding_bytes_written += outcome.padding_bytes as u64;

        let meta = ChunkMeta::new(outcome.store_offset, payload.len(), flags, num_packets);
        if let Some(old) = self.index.insert(key, meta) {
            // Duplicate (producer, writer, chunk): the newest record wins
            // and the displaced one counts as overwritten.
            self.stats.chunks_rewritten += 1;
            self.stats.chunks_overwritten += 1;
            self.stats.bytes_overwritten += ChunkStore::record_size_for(old.payload_len) as u64;
            self.sanity_check(false, "duplicate chunk id resubmitted", &key);
        }

        self.stats.chunks_written += 1;
        self.stats.bytes_written += payload.len() as u64;
        Ok(outcome.record_size)
    }

    /// Overwrite [`PATCH_LEN`] payload bytes of an already-committed chunk.
    ///
    /// Returns `true` iff the chunk is present and `offset + PATCH_LEN`
    /// stays within its exact payload length. Patching never alters the
    /// chunk's size, flags or neighbours, and applying the same patch twice
    /// is idempotent.
    pub fn apply_patch(
        &mut self,
        producer_id: ProducerId,
        writer_id: WriterId,
        chunk_id: ChunkId,
        offset: usize,
        patch: [u8; PATCH_LEN],
    ) -> bool {
        let key = ChunkKey::new(producer_id, writer_id, chunk_id);
        let Some(meta) = self.index.get(&key) else {
            self.stats.patches_rejected += 1;
            debug!(
                producer = producer_id,
                writer = writer_id,
                chunk = chunk_id,
                "patch rejected: chunk not present"
            );
            return false;
        };

        let in_bounds = offset
            .checked_add(PATCH_LEN)
            .is_some_and(|end| end <= meta.payload_len);
        if !in_bounds {
            self.stats.patches_rejected += 1;
            debug!(
                producer = producer_id,
                writer = writer_id,
                chunk = chunk_id,
                offset,
                payload_len = meta.payload_len,
                "patch rejected: offset out of bounds"
            );
            return false;
        }

        let store_offset = meta.store_offset;
        self.store.patch_payload(store_offset, offset, &patch);
        self.stats.patches_applied += 1;
        true
    }

    /// Non-fatal CHECK: log and (in debug builds) assert unless suppressed.
    pub(crate) fn sanity_check(&self, ok: bool, what: &str, key: &ChunkKey) {
        if ok || self.suppress_sanity_checks {
            return;
        }
        warn!(
            producer = key.producer_id,
            writer = key.writer_id,
            chunk = key.chunk_id,
            what,
            "trace buffer sanity check failed"
        );
        debug_assert!(false, "{what} ({key})");
    }
}
