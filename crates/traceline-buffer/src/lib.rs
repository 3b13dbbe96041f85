//! Traceline Trace Buffer
//!
//! This crate implements the heart of the traceline service: a
//! bounded-memory circular buffer that absorbs chunks of serialized trace
//! data from many concurrent writers and hands a consumer an ordered stream
//! of complete trace packets.
//!
//! ## What the buffer does
//!
//! 1. **Stores chunks** in a fixed byte region, appended head-to-tail with
//!    wrap-around and strictly FIFO eviction in physical order.
//! 2. **Orders per writer**: chunks carry a (producer, writer, chunk id)
//!    triple; an ordered index replays each writer's chunks in stream order
//!    even when chunk ids wrap their numeric range, and even when chunks
//!    arrive out of order.
//! 3. **Stitches fragments**: a packet too large for one chunk spans
//!    several; the reader joins the pieces across arbitrary interleavings
//!    and yields exactly one packet.
//! 4. **Patches late**: producers can overwrite 4 placeholder bytes inside
//!    an already-committed chunk (sizes that were unknown at commit time).
//! 5. **Tolerates adversaries**: payload bytes are untrusted; malformed
//!    framing, lying packet counts and duplicate chunk ids degrade into
//!    stats counters, never into process aborts.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ chunks   ┌─────────────────────────────────────┐
//! │  writers  ├─────────►│ TraceBuffer                         │
//! └───────────┘          │  ┌────────────┐   ┌──────────────┐  │
//! ┌───────────┐ patches  │  │ ChunkStore │◄──┤  ChunkIndex  │  │
//! │ producers ├─────────►│  │  (ring)    │   │ (BTreeMap,   │  │
//! └───────────┘          │  └────────────┘   │  modular ids)│  │
//!                        │         ▲         └──────┬───────┘  │
//! ┌───────────┐ packets  │  ┌──────┴─────────┐      │          │
//! │ consumer  │◄─────────┼──┤ reader/stitcher│◄─────┘          │
//! └───────────┘          │  └────────────────┘                 │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! The whole object is single-threaded by design: one service task owns it
//! and every operation completes synchronously. See `traceline-service` for
//! the task wrapper.
//!
//! ## Example
//! ```
//! use traceline_buffer::TraceBuffer;
//! use traceline_core::packet::encode_packet;
//!
//! let mut buffer = TraceBuffer::new(64 * 1024)?;
//!
//! let mut payload = Vec::new();
//! encode_packet(&mut payload, b"hello trace");
//! buffer.append_chunk(1, 1, 0, 0, 1, &payload)?;
//!
//! buffer.begin_read();
//! let packet = buffer.read_next_packet().expect("one packet");
//! assert_eq!(packet.to_vec(), b"hello trace");
//! # Ok::<(), traceline_core::Error>(())
//! ```

pub mod buffer;
mod index;
pub mod reader;
pub mod record;
pub mod stats;
mod store;

pub use buffer::{TraceBuffer, PATCH_LEN};
pub use reader::TracePacket;
pub use record::chunk_flags;
pub use stats::BufferStats;
pub use store::MIN_STORE_SIZE;
