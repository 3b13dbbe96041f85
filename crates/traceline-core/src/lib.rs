//! Core types shared across the traceline workspace.
//!
//! This crate holds the primitives every other traceline crate builds on:
//!
//! - **Identifiers** ([`ids`]): the (producer, writer, chunk) triple that
//!   names a chunk, and the modular arithmetic that makes wrapping chunk ids
//!   comparable.
//! - **Varint codec** ([`varint`]): LEB128 unsigned integers, used for the
//!   length prefix of every packet inside a chunk payload.
//! - **Packet framing** ([`packet`]): the parser that walks the
//!   varint-prefixed packets of one chunk payload and flags malformed
//!   framing without ever panicking on untrusted bytes.
//! - **Errors** ([`error`]): the shared error enum and `Result` alias.
//!
//! Nothing in this crate allocates per-packet or depends on the buffer
//! layout; it is deliberately small so the fuzz targets can drive the parser
//! in isolation.

pub mod error;
pub mod ids;
pub mod packet;
pub mod varint;

pub use error::{Error, Result};
pub use ids::{ChunkId, ChunkKey, ProducerId, WriterId, MAX_CHUNK_ID};
pub use packet::{PacketParser, ParseStep};
