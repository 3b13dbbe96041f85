//! Traceline Service
//!
//! The service layer around the trace buffer. It owns a
//! [`traceline_buffer::TraceBuffer`] on a single tokio task and exposes the
//! three flows the buffer's contract expects, each serialized through one
//! command channel:
//!
//! 1. **Producers** register, create writers, and submit chunks; the
//!    service assigns producer and writer ids, writers assign their own
//!    sequential chunk ids.
//! 2. **Patches** flow sideways into already-committed chunks.
//! 3. **Consumers** drain complete packets; bytes are copied out of the
//!    buffer before they cross the task boundary.
//!
//! ## Example
//! ```no_run
//! use bytes::Bytes;
//! use traceline_service::{ServiceConfig, TracingService};
//!
//! # async fn example() -> traceline_service::Result<()> {
//! let service = TracingService::spawn(ServiceConfig::default())?;
//!
//! let producer = service.register_producer().await?;
//! let mut writer = producer.create_writer().await?;
//!
//! let mut payload = Vec::new();
//! traceline_core::packet::encode_packet(&mut payload, b"hello trace");
//! writer.submit_chunk(0, 1, Bytes::from(payload)).await?;
//!
//! let packets = service.read_packets(16).await?;
//! assert_eq!(packets[0].data.as_ref(), b"hello trace");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::{ServiceConfig, MAX_CHUNK_PAYLOAD};
pub use error::{Error, Result};
pub use service::{ChunkWriter, PacketData, ProducerHandle, ServiceHandle, TracingService};
