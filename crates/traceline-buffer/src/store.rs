//! Chunk Record Store
//!
//! The contiguous byte region where chunk records live. Records are appended
//! head-to-tail at a single write cursor; when a record does not fit in the
//! space left before the end of the region, the tail is sealed with a
//! PADDING record and the cursor wraps to offset 0. Whatever records sit
//! under the cursor are clobbered — the store is exactly a ring with strictly
//! FIFO eviction in physical order.
//!
//! ## Coverage invariant
//!
//! Every byte of the region is covered by exactly one record (DATA, PADDING
//! or FREE) at all times:
//!
//! - the region starts life as a single FREE record;
//! - an eviction walk that clears more bytes than the incoming record needs
//!   seals the leftover with a PADDING record (or FREE, when the walk ended
//!   inside never-written space);
//! - the pre-wrap tail is sealed with a PADDING record even when it is the
//!   minimum 16 bytes.
//!
//! Because the cursor is always 16-aligned and records are multiples of 16,
//! a tail smaller than one header cannot occur.
//!
//! The store knows nothing about the index: the eviction walk reports which
//! DATA records it destroyed and the caller reconciles the index and stats.

use tracing::{debug, trace};

use traceline_core::{Error, Result};

use crate::record::{
    align_record_size, RecordHeader, RecordKind, RECORD_ALIGNMENT, RECORD_HEADER_SIZE,
};

/// Smallest legal store capacity.
pub const MIN_STORE_SIZE: usize = 4096;

/// A DATA record destroyed by an eviction walk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvictedRecord {
    pub header: RecordHeader,
    pub offset: usize,
}

/// Result of appending one chunk record.
#[derive(Debug)]
pub(crate) struct AppendOutcome {
    /// Offset of the new record within the store.
    pub store_offset: usize,
    /// Size of the new record, header and rounding included.
    pub record_size: usize,
    /// DATA records destroyed to make room (tail padding included).
    pub evicted: Vec<EvictedRecord>,
    /// Size of the PADDING record sealed at the tail, 0 if no wrap happened.
    pub padding_bytes: usize,
}

#[derive(Debug)]
pub(crate) struct ChunkStore {
    data: Box<[u8]>,
    write_pos: usize,
}

impl ChunkStore {
    /// Allocate a store of `size_bytes` capacity, rounded up to the record
    /// alignment. Fails with `InvalidConfig` below [`MIN_STORE_SIZE`] or
    /// beyond what a record size field can express.
    pub fn new(size_bytes: usize) -> Result<Self> {
        if size_bytes < MIN_STORE_SIZE || size_bytes > u32::MAX as usize {
            return Err(Error::InvalidConfig(size_bytes));
        }
        let capacity = align_record_size(size_bytes);
        let mut data = vec![0u8; capacity].into_boxed_slice();
        RecordHeader::free(capacity as u32).write_to(&mut data[..RECORD_HEADER_SIZE]);
        Ok(Self { data, write_pos: 0 })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Bytes between the write cursor and the end of the region.
    #[inline]
    pub fn size_to_end(&self) -> usize {
        self.capacity() - self.write_pos
    }

    /// Record size needed for a payload of `payload_len` bytes.
    #[inline]
    pub fn record_size_for(payload_len: usize) -> usize {
        align_record_size(RECORD_HEADER_SIZE + payload_len)
    }

    /// Append one DATA record at the cursor, wrapping first if it does not
    /// fit the remaining tail.
    pub fn append(&mut self, header: RecordHeader, payload: &[u8]) -> Result<AppendOutcome> {
        let record_size = Self::record_size_for(payload.len());
        debug_assert_eq!(record_size, header.size as usize);
        if record_size > self.capacity() {
            return Err(Error::PayloadTooLarge {
                requested: record_size,
                capacity: self.capacity(),
            });
        }

        let mut evicted = Vec::new();
        let mut padding_bytes = 0;

        if record_size > self.size_to_end() {
            // Seal the tail with padding and wrap. The walk below frees the
            // whole tail, so the padding record never splits a victim.
            let tail = self.size_to_end();
            self.clear_records(self.write_pos, tail, &mut evicted);
            let pos = self.write_pos;
            RecordHeader::padding(tail as u32)
                .write_to(&mut self.data[pos..pos + RECORD_HEADER_SIZE]);
            padding_bytes = tail;
            self.write_pos = 0;
            debug!(tail, "sealed tail with padding record, wrapping");
        }

        let (covered, last_kind) = self.clear_records(self.write_pos, record_size, &mut evicted);

        // The walk clears whole records, so it can overshoot what the new
        // record needs; seal the leftover to keep every byte covered.
        if covered > record_size {
            let leftover = (covered - record_size) as u32;
            let leftover_header = match last_kind {
                RecordKind::Free => RecordHeader::free(leftover),
                _ => RecordHeader::padding(leftover),
            };
            let pos = self.write_pos + record_size;
            leftover_header.write_to(&mut self.data[pos..pos + RECORD_HEADER_SIZE]);
        }

        let store_offset = self.write_pos;
        let payload_begin = store_offset + RECORD_HEADER_SIZE;
        header.write_to(&mut self.data[store_offset..payload_begin]);
        self.data[payload_begin..payload_begin + payload.len()].copy_from_slice(payload);
        // Zero the alignment tail so stale bytes never leak into payloads.
        self.data[payload_begin + payload.len()..store_offset + record_size].fill(0);

        self.write_pos += record_size;
        if self.write_pos == self.capacity() {
            self.write_pos = 0;
        }

        trace!(
            offset = store_offset,
            size = record_size,
            evicted = evicted.len(),
            "appended chunk record"
        );

        Ok(AppendOutcome {
            store_offset,
            record_size,
            evicted,
            padding_bytes,
        })
    }

    /// Walk records from `start` until at least `min_len` bytes are covered,
    /// reporting destroyed DATA records. Returns the covered length and the
    /// kind of the last record consumed.
    fn clear_records(
        &self,
        start: usize,
        min_len: usize,
        evicted: &mut Vec<EvictedRecord>,
    ) -> (usize, RecordKind) {
        let mut covered = 0;
        let mut last_kind = RecordKind::Free;
        while covered < min_len {
            let offset = start + covered;
            let header = self.header_at(offset);
            last_kind = header.kind;
            if header.kind == RecordKind::Data {
                evicted.push(EvictedRecord { header, offset });
            }
            covered += header.size as usize;
        }
        (covered, last_kind)
    }

    /// Decode the record header at `offset`.
    ///
    /// The store only reads headers it wrote, so a decode failure means the
    /// region was corrupted from outside; recover by treating the remainder
    /// of the region as free rather than walking garbage sizes.
    fn header_at(&self, offset: usize) -> RecordHeader {
        let decoded = RecordHeader::read_from(&self.data[offset..offset + RECORD_HEADER_SIZE]);
        match decoded {
            Some(h)
                if h.size as usize >= RECORD_HEADER_SIZE
                    && h.size as usize % RECORD_ALIGNMENT == 0
                    && offset + h.size as usize <= self.capacity() =>
            {
                h
            }
            _ => {
                debug_assert!(false, "corrupted record header at offset {offset}");
                RecordHeader::free((self.capacity() - offset) as u32)
            }
        }
    }

    /// Payload bytes of the record at `record_offset`.
    pub fn payload(&self, record_offset: usize, payload_len: usize) -> &[u8] {
        let begin = record_offset + RECORD_HEADER_SIZE;
        &self.data[begin..begin + payload_len]
    }

    /// Raw bytes at an absolute store offset (packet slices for readers).
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Overwrite payload bytes in place. Caller has already bounds-checked
    /// against the exact payload length.
    pub fn patch_payload(&mut self, record_offset: usize, payload_offset: usize, bytes: &[u8]) {
        let begin = record_offset + RECORD_HEADER_SIZE + payload_offset;
        self.data[begin..begin + bytes.len()].copy_from_slice(bytes);
    }

    /// Walk every record in physical order, for invariant checks.
    #[cfg(test)]
    pub fn record_census(&self) -> Vec<(RecordKind, usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.capacity() {
            let header = self.header_at(offset);
            out.push((header.kind, header.size as usize));
            offset += header.size as usize;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceline_core::ids::ChunkKey;

    fn data_header(payload_len: usize, key: ChunkKey) -> RecordHeader {
        RecordHeader::data(ChunkStore::record_size_for(payload_len) as u32, key, 0, 1)
    }

    fn census_total(store: &ChunkStore) -> usize {
        store.record_census().iter().map(|(_, size)| size).sum()
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    #[test]
    fn test_new_rejects_small_sizes() {
        for size in [0usize, 1, 4095] {
            assert_eq!(ChunkStore::new(size).unwrap_err(), Error::InvalidConfig(size));
        }
    }

    #[test]
    fn test_new_rounds_up_capacity() {
        let store = ChunkStore::new(4097).unwrap();
        assert_eq!(store.capacity(), 4112);
    }

    #[test]
    fn test_new_starts_as_one_free_record() {
        let store = ChunkStore::new(4096).unwrap();
        assert_eq!(store.record_census(), vec![(RecordKind::Free, 4096)]);
        assert_eq!(store.write_pos(), 0);
        assert_eq!(store.size_to_end(), 4096);
    }

    // ---------------------------------------------------------------
    // Append without wrapping
    // ---------------------------------------------------------------

    #[test]
    fn test_append_advances_cursor_and_keeps_coverage() {
        let mut store = ChunkStore::new(4096).unwrap();
        let payload = vec![0xABu8; 100];
        let outcome = store
            .append(data_header(100, ChunkKey::new(1, 1, 0)), &payload)
            .unwrap();
        assert_eq!(outcome.store_offset, 0);
        assert_eq!(outcome.record_size, align_record_size(116));
        assert_eq!(outcome.padding_bytes, 0);
        assert!(outcome.evicted.is_empty());
        assert_eq!(store.write_pos(), outcome.record_size);
        assert_eq!(census_total(&store), 4096);
        assert_eq!(store.payload(0, 100), &payload[..]);
    }

    #[test]
    fn test_append_zeroes_alignment_tail() {
        let mut store = ChunkStore::new(4096).unwrap();
        store
            .append(data_header(1, ChunkKey::new(1, 1, 0)), &[0xFF])
            .unwrap();
        // 15 alignment bytes after the 1-byte payload must read zero.
        let record = &store.data[RECORD_HEADER_SIZE..32];
        assert_eq!(record[0], 0xFF);
        assert!(record[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_append_too_large_fails() {
        let mut store = ChunkStore::new(4096).unwrap();
        let payload = vec![0u8; 4096];
        let err = store
            .append(data_header(4096, ChunkKey::new(1, 1, 0)), &payload)
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_fill_exactly_resets_cursor() {
        let mut store = ChunkStore::new(4096).unwrap();
        for (id, size) in [512usize, 512, 1024, 2048].into_iter().enumerate() {
            let payload = vec![id as u8; size - RECORD_HEADER_SIZE];
            store
                .append(
                    data_header(payload.len(), ChunkKey::new(1, 1, id as u32)),
                    &payload,
                )
                .unwrap();
        }
        assert_eq!(store.write_pos(), 0);
        assert_eq!(store.size_to_end(), 4096);
    }

    // ---------------------------------------------------------------
    // Wrapping and eviction
    // ---------------------------------------------------------------

    #[test]
    fn test_wrap_seals_tail_with_padding_and_evicts() {
        let mut store = ChunkStore::new(4096).unwrap();
        // Fill with 8 records of 512 bytes.
        for id in 0..8u32 {
            let payload = vec![id as u8; 512 - RECORD_HEADER_SIZE];
            store
                .append(data_header(payload.len(), ChunkKey::new(1, 1, id)), &payload)
                .unwrap();
        }
        // Cursor wrapped to 0; the next 1024-byte record clobbers ids 0 and 1.
        let payload = vec![9u8; 1024 - RECORD_HEADER_SIZE];
        let outcome = store
            .append(data_header(payload.len(), ChunkKey::new(1, 1, 8)), &payload)
            .unwrap();
        assert_eq!(outcome.store_offset, 0);
        let evicted_ids: Vec<u32> = outcome.evicted.iter().map(|e| e.header.chunk_id).collect();
        assert_eq!(evicted_ids, vec![0, 1]);
        assert_eq!(census_total(&store), 4096);
    }

    #[test]
    fn test_partial_eviction_seals_leftover_with_padding() {
        let mut store = ChunkStore::new(4096).unwrap();
        for id in 0..2u32 {
            let payload = vec![id as u8; 2048 - RECORD_HEADER_SIZE];
            store
                .append(data_header(payload.len(), ChunkKey::new(1, 1, id)), &payload)
                .unwrap();
        }
        // Wrapped. A 512-byte record destroys the whole 2048-byte id 0.
        let payload = vec![7u8; 512 - RECORD_HEADER_SIZE];
        let outcome = store
            .append(data_header(payload.len(), ChunkKey::new(1, 1, 2)), &payload)
            .unwrap();
        assert_eq!(outcome.evicted.len(), 1);
        let census = store.record_census();
        assert_eq!(
            census,
            vec![
                (RecordKind::Data, 512),
                (RecordKind::Padding, 1536),
                (RecordKind::Data, 2048),
            ]
        );
    }

    #[test]
    fn test_leftover_inside_free_region_stays_free() {
        let mut store = ChunkStore::new(4096).unwrap();
        let payload = vec![1u8; 100];
        store
            .append(data_header(100, ChunkKey::new(1, 1, 0)), &payload)
            .unwrap();
        let census = store.record_census();
        assert_eq!(census[0].0, RecordKind::Data);
        assert_eq!(census[1].0, RecordKind::Free);
        assert_eq!(census_total(&store), 4096);
    }

    #[test]
    fn test_unaligned_eviction_seals_leftover() {
        let mut store = ChunkStore::new(4096).unwrap();
        // 8 x 512, then 2080 wraps and clobbers 0..=4 partially (2080 needs
        // the first 5 x 512 = 2560 covered; leftover 480 sealed as padding).
        for id in 0..8u32 {
            let payload = vec![id as u8; 512 - RECORD_HEADER_SIZE];
            store
                .append(data_header(payload.len(), ChunkKey::new(1, 1, id)), &payload)
                .unwrap();
        }
        let payload = vec![8u8; 2080 - RECORD_HEADER_SIZE];
        let outcome = store
            .append(data_header(payload.len(), ChunkKey::new(1, 1, 8)), &payload)
            .unwrap();
        assert_eq!(outcome.evicted.len(), 5);
        assert_eq!(store.size_to_end(), 4096 - 2080);
        assert_eq!(census_total(&store), 4096);
    }

    #[test]
    fn test_minimal_16_byte_padding_at_tail() {
        let mut store = ChunkStore::new(4096).unwrap();
        let payload = vec![1u8; 4080 - RECORD_HEADER_SIZE];
        store
            .append(data_header(payload.len(), ChunkKey::new(1, 1, 0)), &payload)
            .unwrap();
        assert_eq!(store.size_to_end(), 16);
        // The next record cannot fit 16 bytes; tail sealed, cursor wrapped.
        let payload = vec![2u8; 32 - RECORD_HEADER_SIZE];
        let outcome = store
            .append(data_header(payload.len(), ChunkKey::new(1, 1, 1)), &payload)
            .unwrap();
        assert_eq!(outcome.padding_bytes, 16);
        assert_eq!(outcome.store_offset, 0);
        assert_eq!(census_total(&store), 4096);
    }

    // ---------------------------------------------------------------
    // Patching bytes
    // ---------------------------------------------------------------

    #[test]
    fn test_patch_payload_in_place() {
        let mut store = ChunkStore::new(4096).unwrap();
        let payload = vec![b'x'; 32];
        store
            .append(data_header(32, ChunkKey::new(1, 1, 0)), &payload)
            .unwrap();
        store.patch_payload(0, 4, b"YMCA");
        assert_eq!(&store.payload(0, 32)[4..8], b"YMCA");
        assert_eq!(&store.payload(0, 32)[..4], b"xxxx");
    }
}
