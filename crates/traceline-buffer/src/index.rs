//! Chunk Index
//!
//! An ordered map from [`ChunkKey`] to [`ChunkMeta`] — the sole source of
//! truth for which chunks are readable, in what order, and how far each has
//! been consumed.
//!
//! ## Ordering
//!
//! `ChunkKey` groups entries by (producer, writer) with the chunk id as the
//! minor key under signed modular distance (see `traceline_core::ids`), so a
//! plain forward walk of the map visits every writer sequence in stream
//! order even when chunk ids wrap around their numeric maximum:
//!
//! ```text
//! {1,1,4294967294} {1,1,4294967295} {1,1,0} {1,1,1} {1,2,7} {2,1,0} ...
//! |---------- writer (1,1) in stream order ---------|
//! ```
//!
//! The first entry encountered for a (producer, writer) pair while walking
//! forward is therefore always that writer's earliest live chunk.
//!
//! ## Read progress
//!
//! `ChunkMeta` carries how many packets of the chunk have been consumed and
//! the byte offset where parsing resumes. Progress survives `begin_read`:
//! a packet is delivered at most once per buffer lifetime, and a read pass
//! simply skips chunks that are already drained.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use traceline_core::ids::{ChunkKey, ProducerId, WriterId};

use crate::record::chunk_flags;

/// Location and read state of one DATA chunk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkMeta {
    /// Offset of the record within the store.
    pub store_offset: usize,
    /// Exact payload length as submitted (without alignment fill).
    pub payload_len: usize,
    /// Continuation flag bits, as declared by the producer.
    pub flags: u8,
    /// Packet count, as declared by the producer.
    pub num_packets: u16,
    /// Packets consumed so far (skipped packets count as consumed).
    pub num_packets_read: u16,
    /// Payload offset where the next unread packet starts.
    pub parse_offset: usize,
}

impl ChunkMeta {
    pub fn new(store_offset: usize, payload_len: usize, flags: u8, num_packets: u16) -> Self {
        Self {
            store_offset,
            payload_len,
            flags,
            num_packets,
            num_packets_read: 0,
            parse_offset: 0,
        }
    }

    /// True while the chunk still has packets the reader has not consumed.
    #[inline]
    pub fn has_unread_packets(&self) -> bool {
        self.num_packets_read < self.num_packets
    }

    /// True once some but not all packets were consumed — destroying the
    /// chunk now loses part of an in-progress fragment chain.
    #[inline]
    pub fn partially_read(&self) -> bool {
        self.num_packets_read > 0 && self.has_unread_packets()
    }

    #[inline]
    pub fn continues_from_prev(&self) -> bool {
        self.flags & chunk_flags::FIRST_PACKET_CONTINUES_FROM_PREV != 0
    }

    #[inline]
    pub fn continues_on_next(&self) -> bool {
        self.flags & chunk_flags::LAST_PACKET_CONTINUES_ON_NEXT != 0
    }

    /// Mark every remaining packet as consumed (malformed-chunk abort).
    pub fn mark_fully_read(&mut self) {
        self.num_packets_read = self.num_packets;
        self.parse_offset = self.payload_len;
    }
}

/// The ordered chunk index.
#[derive(Debug, Default)]
pub(crate) struct ChunkIndex {
    map: BTreeMap<ChunkKey, ChunkMeta>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Insert an entry, returning the displaced one if the key was already
    /// present (duplicate chunk id from a buggy or malicious producer).
    pub fn insert(&mut self, key: ChunkKey, meta: ChunkMeta) -> Option<ChunkMeta> {
        self.map.insert(key, meta)
    }

    pub fn remove(&mut self, key: &ChunkKey) -> Option<ChunkMeta> {
        self.map.remove(key)
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&ChunkMeta> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &ChunkKey) -> Option<&mut ChunkMeta> {
        self.map.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Globally first key: the earliest live chunk of the first sequence.
    pub fn first_key(&self) -> Option<ChunkKey> {
        self.map.keys().next().copied()
    }

    /// Successor of `key` in global order, regardless of sequence.
    pub fn next_key(&self, key: &ChunkKey) -> Option<ChunkKey> {
        self.map
            .range((Excluded(*key), Unbounded))
            .next()
            .map(|(k, _)| *k)
    }

    /// Successor of `key` restricted to the same (producer, writer)
    /// sequence.
    pub fn next_key_in_sequence(&self, key: &ChunkKey) -> Option<ChunkKey> {
        self.next_key(key).filter(|k| k.sequence() == key.sequence())
    }

    /// First key of the sequence after the one `key` belongs to.
    pub fn next_sequence_start(&self, key: &ChunkKey) -> Option<ChunkKey> {
        self.map
            .range((Excluded(*key), Unbounded))
            .map(|(k, _)| *k)
            .find(|k| k.sequence() != key.sequence())
    }

    /// All keys of one sequence in stream order.
    pub fn sequence_keys(&self, producer_id: ProducerId, writer_id: WriterId) -> Vec<ChunkKey> {
        // A modularly-ordered minor key has no global minimum to seed a
        // range query with, so locate the sequence by walking from the
        // nearest preceding sequence boundary.
        let mut out = Vec::new();
        let mut cur = self.first_key();
        while let Some(key) = cur {
            if key.sequence() == (producer_id, writer_id) {
                out.push(key);
                cur = self.next_key(&key);
            } else if key.sequence() < (producer_id, writer_id) {
                cur = self.next_sequence_start(&key);
            } else {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceline_core::ids::MAX_CHUNK_ID;

    fn meta() -> ChunkMeta {
        ChunkMeta::new(0, 64, 0, 1)
    }

    fn index_of(keys: &[(u16, u16, u32)]) -> ChunkIndex {
        let mut index = ChunkIndex::new();
        for &(p, w, c) in keys {
            index.insert(ChunkKey::new(p, w, c), meta());
        }
        index
    }

    // ---------------------------------------------------------------
    // Ordering and traversal
    // ---------------------------------------------------------------

    #[test]
    fn test_first_key_is_earliest_chunk_of_first_sequence() {
        let index = index_of(&[(1, 1, 5), (1, 1, 2), (1, 2, 0), (2, 1, 9)]);
        assert_eq!(index.first_key(), Some(ChunkKey::new(1, 1, 2)));
    }

    #[test]
    fn test_next_key_in_sequence_stops_at_boundary() {
        let index = index_of(&[(1, 1, 0), (1, 1, 1), (1, 2, 0)]);
        let k0 = ChunkKey::new(1, 1, 0);
        assert_eq!(
            index.next_key_in_sequence(&k0),
            Some(ChunkKey::new(1, 1, 1))
        );
        let k1 = ChunkKey::new(1, 1, 1);
        assert_eq!(index.next_key_in_sequence(&k1), None);
    }

    #[test]
    fn test_next_sequence_start_skips_remaining_chunks() {
        let index = index_of(&[(1, 1, 0), (1, 1, 1), (1, 1, 2), (1, 2, 7), (3, 1, 0)]);
        let k0 = ChunkKey::new(1, 1, 0);
        assert_eq!(index.next_sequence_start(&k0), Some(ChunkKey::new(1, 2, 7)));
        let k = ChunkKey::new(1, 2, 7);
        assert_eq!(index.next_sequence_start(&k), Some(ChunkKey::new(3, 1, 0)));
        let last = ChunkKey::new(3, 1, 0);
        assert_eq!(index.next_sequence_start(&last), None);
    }

    #[test]
    fn test_sequence_keys_ordered() {
        let index = index_of(&[
            (1, 1, 0),
            (1, 1, 1),
            (1, 2, 0),
            (3, 1, 0),
            (1, 2, 3),
            (1, 2, 5),
            (3, 1, 7),
            (1, 1, 6),
            (3, 1, 8),
        ]);
        let ids = |p, w| -> Vec<u32> {
            index
                .sequence_keys(p, w)
                .iter()
                .map(|k| k.chunk_id)
                .collect()
        };
        assert_eq!(ids(1, 1), vec![0, 1, 6]);
        assert_eq!(ids(1, 2), vec![0, 3, 5]);
        assert_eq!(ids(3, 1), vec![0, 7, 8]);
        assert_eq!(ids(1, 3), Vec::<u32>::new());
        assert_eq!(ids(9, 9), Vec::<u32>::new());
    }

    #[test]
    fn test_sequence_keys_across_wrap() {
        let neg = |x: i64| (MAX_CHUNK_ID as i64 + 1 + x) as u32;
        let index = index_of(&[
            (1, 1, neg(-4)),
            (1, 1, neg(-3)),
            (1, 2, neg(-2)),
            (3, 1, neg(-1)),
            (1, 2, 0),
            (1, 2, 1),
            (3, 1, 2),
            (1, 1, 3),
            (3, 1, 4),
        ]);
        let ids = |p, w| -> Vec<u32> {
            index
                .sequence_keys(p, w)
                .iter()
                .map(|k| k.chunk_id)
                .collect()
        };
        assert_eq!(ids(1, 1), vec![neg(-4), neg(-3), 3]);
        assert_eq!(ids(1, 2), vec![neg(-2), 0, 1]);
        assert_eq!(ids(3, 1), vec![neg(-1), 2, 4]);
    }

    // ---------------------------------------------------------------
    // Insert / remove
    // ---------------------------------------------------------------

    #[test]
    fn test_insert_duplicate_returns_displaced_meta() {
        let mut index = ChunkIndex::new();
        let key = ChunkKey::new(1, 1, 0);
        assert!(index.insert(key, ChunkMeta::new(0, 10, 0, 1)).is_none());
        let old = index.insert(key, ChunkMeta::new(64, 20, 0, 2)).unwrap();
        assert_eq!(old.store_offset, 0);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&key).unwrap().store_offset, 64);
    }

    #[test]
    fn test_remove_absent_key() {
        let mut index = index_of(&[(1, 1, 0)]);
        assert!(index.remove(&ChunkKey::new(1, 1, 1)).is_none());
        assert!(index.remove(&ChunkKey::new(1, 1, 0)).is_some());
        assert_eq!(index.len(), 0);
    }

    // ---------------------------------------------------------------
    // ChunkMeta read progress
    // ---------------------------------------------------------------

    #[test]
    fn test_meta_read_progress() {
        let mut m = ChunkMeta::new(0, 100, 0, 3);
        assert!(m.has_unread_packets());
        assert!(!m.partially_read());
        m.num_packets_read = 1;
        assert!(m.partially_read());
        m.mark_fully_read();
        assert!(!m.has_unread_packets());
        assert_eq!(m.parse_offset, 100);
    }

    #[test]
    fn test_meta_flags() {
        let m = ChunkMeta::new(0, 0, chunk_flags::FIRST_PACKET_CONTINUES_FROM_PREV, 0);
        assert!(m.continues_from_prev());
        assert!(!m.continues_on_next());
        let m = ChunkMeta::new(0, 0, chunk_flags::ALL, 0);
        assert!(m.continues_from_prev());
        assert!(m.continues_on_next());
    }
}
