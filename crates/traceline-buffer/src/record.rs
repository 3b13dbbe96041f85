//! Chunk Record Layout
//!
//! The byte store is a sequence of 16-byte-aligned records, each starting
//! with a fixed 16-byte header followed by the record payload:
//!
//! ```text
//! offset  field        type
//! 0..4    size         u32 LE   record size including header, multiple of 16
//! 4..6    producer_id  u16 LE
//! 6..8    writer_id    u16 LE
//! 8..12   chunk_id     u32 LE
//! 12      flags        u8       fragment continuation bits
//! 13      kind         u8       FREE / DATA / PADDING
//! 14..16  num_packets  u16 LE   producer-declared packet count
//! ```
//!
//! Three record kinds cover every byte of the store at all times:
//!
//! - **DATA**: a chunk committed by a writer. The only kind the index knows
//!   about.
//! - **PADDING**: dead bytes — the unusable tail before a wrap, or the
//!   leftover of an eviction walk that cleared more than the new record
//!   needed.
//! - **FREE**: bytes never written since creation. The store starts as one
//!   FREE record spanning the whole region.
//!
//! Payloads are rounded up to the 16-byte alignment with a zeroed tail; the
//! exact (unrounded) payload length lives in the index, not in the header.

use traceline_core::ids::{ChunkId, ChunkKey, ProducerId, WriterId};

/// Size of the fixed record header.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Records begin and end on multiples of this.
pub const RECORD_ALIGNMENT: usize = 16;

/// Round `n` up to the record alignment.
#[inline]
pub const fn align_record_size(n: usize) -> usize {
    (n + (RECORD_ALIGNMENT - 1)) & !(RECORD_ALIGNMENT - 1)
}

/// Chunk flag bits carried in the record header (and in `ChunkMeta`).
pub mod chunk_flags {
    /// The chunk's first packet is the continuation of the previous chunk's
    /// last packet.
    pub const FIRST_PACKET_CONTINUES_FROM_PREV: u8 = 1 << 0;
    /// The chunk's last packet continues in the next chunk.
    pub const LAST_PACKET_CONTINUES_ON_NEXT: u8 = 1 << 1;

    /// Mask of bits a producer may legitimately set.
    pub const ALL: u8 = FIRST_PACKET_CONTINUES_FROM_PREV | LAST_PACKET_CONTINUES_ON_NEXT;
}

/// Discriminates what a record's bytes mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Free = 0,
    Data = 1,
    Padding = 2,
}

impl RecordKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::Free),
            1 => Some(RecordKind::Data),
            2 => Some(RecordKind::Padding),
            _ => None,
        }
    }
}

/// Decoded form of the 16-byte in-store record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub size: u32,
    pub producer_id: ProducerId,
    pub writer_id: WriterId,
    pub chunk_id: ChunkId,
    pub flags: u8,
    pub kind: RecordKind,
    pub num_packets: u16,
}

impl RecordHeader {
    /// Header for a DATA record.
    pub fn data(size: u32, key: ChunkKey, flags: u8, num_packets: u16) -> Self {
        Self {
            size,
            producer_id: key.producer_id,
            writer_id: key.writer_id,
            chunk_id: key.chunk_id,
            flags,
            kind: RecordKind::Data,
            num_packets,
        }
    }

    /// Header for a PADDING record covering `size` bytes.
    pub fn padding(size: u32) -> Self {
        Self {
            size,
            producer_id: 0,
            writer_id: 0,
            chunk_id: 0,
            flags: 0,
            kind: RecordKind::Padding,
            num_packets: 0,
        }
    }

    /// Header for a FREE record covering `size` bytes.
    pub fn free(size: u32) -> Self {
        Self {
            size,
            producer_id: 0,
            writer_id: 0,
            chunk_id: 0,
            flags: 0,
            kind: RecordKind::Free,
            num_packets: 0,
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.producer_id, self.writer_id, self.chunk_id)
    }

    /// Encode into the first [`RECORD_HEADER_SIZE`] bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4..6].copy_from_slice(&self.producer_id.to_le_bytes());
        buf[6..8].copy_from_slice(&self.writer_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.chunk_id.to_le_bytes());
        buf[12] = self.flags;
        buf[13] = self.kind as u8;
        buf[14..16].copy_from_slice(&self.num_packets.to_le_bytes());
    }

    /// Decode from the first [`RECORD_HEADER_SIZE`] bytes of `buf`.
    ///
    /// Returns `None` on an unknown kind byte. The store only ever reads
    /// headers it wrote itself, so `None` indicates internal corruption and
    /// is handled defensively by the caller.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let producer_id = u16::from_le_bytes([buf[4], buf[5]]);
        let writer_id = u16::from_le_bytes([buf[6], buf[7]]);
        let chunk_id = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let flags = buf[12];
        let kind = RecordKind::from_u8(buf[13])?;
        let num_packets = u16::from_le_bytes([buf[14], buf[15]]);
        Some(Self {
            size,
            producer_id,
            writer_id,
            chunk_id,
            flags,
            kind,
            num_packets,
        })
    }
}
