//! Packet Framing
//!
//! A chunk payload is a back-to-back sequence of packets, each prefixed by a
//! varint length:
//!
//! ```text
//! [len0][packet0 bytes...][len1][packet1 bytes...]...
//! ```
//!
//! The payload bytes come straight from a producer and are **untrusted**:
//! lengths can lie, varints can be truncated, and a malicious writer can
//! craft framing that would walk a naive parser out of bounds. The parser
//! here therefore validates every step against the enclosing payload and
//! reports [`ParseStep::Malformed`] instead of panicking; the caller is
//! expected to abandon the chunk on the first malformed step.
//!
//! A zero packet length with payload bytes still remaining is the malformed
//! sentinel: honest writers never produce it, and accepting it would make an
//! attacker-controlled parser loop make no progress.
//!
//! ## Example
//! ```
//! use traceline_core::packet::{encode_packet, PacketParser, ParseStep};
//!
//! let mut payload = Vec::new();
//! encode_packet(&mut payload, b"hello");
//! encode_packet(&mut payload, b"world");
//!
//! let mut parser = PacketParser::new(&payload);
//! assert!(matches!(parser.next_packet(), ParseStep::Packet(b"hello")));
//! assert!(matches!(parser.next_packet(), ParseStep::Packet(b"world")));
//! assert!(matches!(parser.next_packet(), ParseStep::Eof));
//! ```

use bytes::BufMut;

use crate::varint;

/// Outcome of one [`PacketParser::next_packet`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep<'a> {
    /// A complete packet payload (without its length prefix).
    Packet(&'a [u8]),
    /// The payload is fully consumed.
    Eof,
    /// Invalid framing: truncated/overlong varint, a length running past the
    /// payload, or a zero length with payload remaining. The chunk must be
    /// abandoned.
    Malformed,
}

/// Walks the varint-prefixed packets of one chunk payload.
///
/// The parser holds only a position within the payload, so the read path can
/// persist that position between passes and resume with [`PacketParser::at_offset`].
#[derive(Debug)]
pub struct PacketParser<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PacketParser<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    /// Resume parsing at a byte offset previously returned by [`Self::offset`].
    ///
    /// An offset past the payload end clamps to `Eof` rather than panicking:
    /// the stored offset may refer to bytes that have since been rewritten
    /// by a smaller duplicate chunk.
    pub fn at_offset(payload: &'a [u8], offset: usize) -> Self {
        Self {
            payload,
            pos: offset.min(payload.len()),
        }
    }

    /// Current position within the payload, for resuming later.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.pos
    }

    /// Parse the next packet.
    ///
    /// After `Malformed` the parser position is unspecified; callers must
    /// not continue on the same payload.
    pub fn next_packet(&mut self) -> ParseStep<'a> {
        if self.pos == self.payload.len() {
            return ParseStep::Eof;
        }

        let rest = &self.payload[self.pos..];
        let Some((len, varint_len)) = varint::decode_u64(rest) else {
            return ParseStep::Malformed;
        };

        let body = &rest[varint_len..];
        if len > body.len() as u64 {
            return ParseStep::Malformed;
        }
        let len = len as usize;
        // A zero length is tolerated only as the very last entry of the
        // payload; anywhere else it is the malformed sentinel.
        if len == 0 && !body.is_empty() {
            return ParseStep::Malformed;
        }

        self.pos += varint_len + len;
        ParseStep::Packet(&body[..len])
    }
}

/// Append one length-prefixed packet to `buf`.
pub fn encode_packet(buf: &mut impl BufMut, packet: &[u8]) {
    varint::encode_u64(buf, packet.len() as u64);
    buf.put_slice(packet);
}

/// Encoded size of a packet of `len` payload bytes, prefix included.
pub fn encoded_packet_len(len: usize) -> usize {
    varint::encoded_len(len as u64) + len
}
