//! Read Iterator and Fragment Stitcher
//!
//! Turns the chunk index into the stream of complete trace packets the
//! consumer sees. A read pass walks the index in order (each writer
//! sequence in modular chunk-id order, sequences in key order) and, per
//! chunk, consumes unread packets one of three ways:
//!
//! - **Skip**: the chunk's first unread packet claims to continue from a
//!   previous chunk, but the reader has no in-progress packet — the
//!   predecessor is gone for good (evicted or never seen). The orphaned
//!   fragment is consumed and dropped.
//! - **Read one**: an inner packet, or a final packet that does not
//!   continue — yield it directly.
//! - **Read ahead**: the last unread packet continues on the next chunk.
//!   Scan forward through the sequence for the rest of the chain; if every
//!   link is present and contiguous, consume one fragment per link and
//!   yield them as a single stitched packet. If a link is missing the
//!   sequence *stalls*: the reader parks it and moves to the next sequence,
//!   so a later arrival can complete the packet. Packets already yielded
//!   from earlier in the chunk are never withheld by a stall.
//!
//! Empty chunks are transparent chain links: they neither break a chain nor
//! contribute bytes. A malformed chunk poisons the chain it participates in
//! — everything stitched so far is dropped, matching the rule that
//! consumers only ever see complete packets.
//!
//! ## Borrowed slices
//!
//! [`TracePacket`] borrows the store: slices stay valid only until the next
//! buffer mutation, which the borrow checker enforces by holding the shared
//! borrow of the buffer. Consumers that need the bytes past that point copy
//! them (the service layer does exactly this before crossing tasks).

use tracing::trace;

use traceline_core::ids::{ChunkId, ChunkKey, ProducerId, WriterId};
use traceline_core::packet::{PacketParser, ParseStep};

use crate::buffer::TraceBuffer;
use crate::record::RECORD_HEADER_SIZE;

/// One complete trace packet, as an ordered list of byte slices into the
/// buffer plus the identity of the chunk holding the packet's first byte.
#[derive(Debug, PartialEq, Eq)]
pub struct TracePacket<'a> {
    pub producer_id: ProducerId,
    pub writer_id: WriterId,
    pub chunk_id: ChunkId,
    pub slices: Vec<&'a [u8]>,
}

impl TracePacket<'_> {
    /// Total payload length across all slices.
    pub fn len(&self) -> usize {
        self.slices.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate the slices into one owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for slice in &self.slices {
            out.extend_from_slice(slice);
        }
        out
    }
}

/// What became of one consumed packet.
enum Consumed {
    /// Absolute (offset, len) byte range of the packet within the store.
    Packet { range: (usize, usize) },
    /// Framing was invalid; the chunk has been marked fully read.
    Malformed,
}

enum ReadAheadOutcome {
    /// The whole chain is present; `ranges` holds one fragment per link.
    Complete {
        chain_end: ChunkKey,
        ranges: Vec<(usize, usize)>,
    },
    /// A link is missing or unusable; park the sequence for later.
    Stalled,
    /// A link was malformed; the stitched packet is lost.
    Corrupted { chain_end: ChunkKey },
}

impl TraceBuffer {
    /// Start (or restart) a read pass over all writers.
    ///
    /// Read progress on individual chunks is preserved: packets already
    /// yielded are never yielded again. A new pass only re-examines chunks
    /// that still hold unread packets — typically ones that stalled waiting
    /// for a successor that has since arrived.
    pub fn begin_read(&mut self) {
        self.read_pos = self.index.first_key();
    }

    /// Yield the next complete packet, or `None` when the pass is over.
    ///
    /// Between writers the order is unspecified; within one writer packets
    /// come in FIFO order under modular chunk ids.
    pub fn read_next_packet(&mut self) -> Option<TracePacket<'_>> {
        let (first_key, ranges) = self.read_next_ranges()?;
        let slices = ranges
            .iter()
            .map(|&(offset, len)| self.store.bytes(offset, len))
            .collect();
        Some(TracePacket {
            producer_id: first_key.producer_id,
            writer_id: first_key.writer_id,
            chunk_id: first_key.chunk_id,
            slices,
        })
    }

    /// Core of the read loop: returns the key of the chunk holding the
    /// packet's first fragment and the absolute store ranges of all its
    /// fragments, in order.
    fn read_next_ranges(&mut self) -> Option<(ChunkKey, Vec<(usize, usize)>)> {
        'chunks: loop {
            let cur = self.read_pos?;
            if self.index.get(&cur).is_none() {
                // The chunk under the cursor was evicted between calls;
                // resume at the nearest live entry.
                self.read_pos = self.index.next_key(&cur);
                continue 'chunks;
            }

            'packets: loop {
                let meta = match self.index.get(&cur) {
                    Some(m) if m.has_unread_packets() => *m,
                    _ => break 'packets,
                };

                if meta.num_packets_read == 0 && meta.continues_from_prev() {
                    // Orphaned head fragment: had the predecessor been
                    // readable, an earlier step would have consumed this
                    // fragment as part of its chain.
                    let _ = self.consume_packet(&cur);
                    self.stats.fragments_dropped_orphan += 1;
                    trace!(
                        producer = cur.producer_id,
                        writer = cur.writer_id,
                        chunk = cur.chunk_id,
                        "dropped orphaned fragment"
                    );
                    continue 'packets;
                }

                let is_last_unread = meta.num_packets_read + 1 == meta.num_packets;
                if is_last_unread && meta.continues_on_next() {
                    match self.read_ahead(cur) {
                        ReadAheadOutcome::Complete { chain_end, ranges } => {
                            self.stats.readaheads_succeeded += 1;
                            self.read_pos = Some(chain_end);
                            return Some((cur, ranges));
                        }
                        ReadAheadOutcome::Stalled => {
                            self.stats.readaheads_failed += 1;
                            self.read_pos = self.index.next_sequence_start(&cur);
                            continue 'chunks;
                        }
                        ReadAheadOutcome::Corrupted { chain_end } => {
                            self.stats.readaheads_failed += 1;
                            self.read_pos = self.index.next_key(&chain_end);
                            continue 'chunks;
                        }
                    }
                }

                match self.consume_packet(&cur) {
                    Consumed::Packet { range } => return Some((cur, vec![range])),
                    Consumed::Malformed => break 'packets,
                }
            }

            self.read_pos = self.index.next_key(&cur);
        }
    }

    /// Attempt to stitch the fragment chain starting at `start`, whose last
    /// unread packet continues on the next chunk.
    fn read_ahead(&mut self, start: ChunkKey) -> ReadAheadOutcome {
        // First locate the chain end without consuming anything, so a
        // missing link leaves every fragment unread for a later pass.
        let mut expected_id = start.chunk_id.wrapping_add(1);
        let mut cursor = self.index.next_key_in_sequence(&start);
        let chain_end = loop {
            let Some(key) = cursor else {
                return ReadAheadOutcome::Stalled;
            };
            let Some(meta) = self.index.get(&key).copied() else {
                return ReadAheadOutcome::Stalled;
            };

            if meta.num_packets == 0 {
                // Empty chunk inside the chain: transparent.
                expected_id = expected_id.wrapping_add(1);
                cursor = self.index.next_key_in_sequence(&key);
                continue;
            }

            // A gap in chunk ids means the link may still arrive: stall.
            // A present link that does not declare the continuation is a
            // writer that crashed mid-packet; there is nothing to wait for,
            // but the chain is equally unreadable.
            if key.chunk_id != expected_id || !meta.continues_from_prev() {
                return ReadAheadOutcome::Stalled;
            }

            if meta.num_packets == 1 && meta.continues_on_next() {
                // Middle link of a long chain.
                expected_id = expected_id.wrapping_add(1);
                cursor = self.index.next_key_in_sequence(&key);
                continue;
            }

            break key;
        };

        // Chain complete: consume one fragment per non-empty link.
        let mut ranges = Vec::new();
        let mut corrupted = false;
        let mut key = start;
        loop {
            let non_empty = self.index.get(&key).is_some_and(|m| m.num_packets > 0);
            if non_empty {
                match self.consume_packet(&key) {
                    Consumed::Packet { range } => ranges.push(range),
                    Consumed::Malformed => corrupted = true,
                }
            }
            if key == chain_end {
                break;
            }
            key = match self.index.next_key_in_sequence(&key) {
                Some(k) => k,
                None => {
                    corrupted = true;
                    break;
                }
            };
        }

        if corrupted {
            ReadAheadOutcome::Corrupted { chain_end }
        } else {
            trace!(
                producer = start.producer_id,
                writer = start.writer_id,
                first_chunk = start.chunk_id,
                fragments = ranges.len(),
                "stitched fragmented packet"
            );
            ReadAheadOutcome::Complete { chain_end, ranges }
        }
    }

    /// Consume the next unread packet of `key`, advancing the chunk's parse
    /// state. Invalid framing (or a packet count claiming more than the
    /// payload holds) marks the whole chunk read and discards it.
    fn consume_packet(&mut self, key: &ChunkKey) -> Consumed {
        let Some(meta) = self.index.get(key).copied() else {
            return Consumed::Malformed;
        };

        let payload = self.store.payload(meta.store_offset, meta.payload_len);
        let mut parser = PacketParser::at_offset(payload, meta.parse_offset);
        match parser.next_packet() {
            ParseStep::Packet(packet) => {
                let end = parser.offset();
                let abs = meta.store_offset + RECORD_HEADER_SIZE + (end - packet.len());
                let len = packet.len();
                if let Some(m) = self.index.get_mut(key) {
                    m.parse_offset = end;
                    m.num_packets_read += 1;
                }
                Consumed::Packet { range: (abs, len) }
            }
            ParseStep::Eof | ParseStep::Malformed => {
                // Eof here means the declared packet count lied about the
                // payload; both cases abandon the chunk.
                if let Some(m) = self.index.get_mut(key) {
                    m.mark_fully_read();
                }
                self.stats.chunks_discarded_malformed += 1;
                self.sanity_check(false, "malformed packet framing", key);
                Consumed::Malformed
            }
        }
    }
}
