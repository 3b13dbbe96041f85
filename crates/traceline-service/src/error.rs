//! Service Error Types
//!
//! Errors surfaced at the service boundary.
//!
//! ## Error Categories
//!
//! ### Buffer Errors
//! - `Buffer`: a buffer operation failed (invalid configuration, record
//!   larger than the whole buffer)
//!
//! ### Admission Errors
//! - `ChunkTooLarge`: a producer submitted a payload over the service-wide
//!   `MAX_CHUNK_PAYLOAD` limit
//! - `ProducerIdsExhausted`: the 16-bit producer id space ran out
//!
//! ### Lifecycle Errors
//! - `ServiceStopped`: the owning task is gone; the handle is stale
//!
//! All service operations return `Result<T>`, aliased to
//! `Result<T, Error>`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("trace buffer error: {0}")]
    Buffer(#[from] traceline_core::Error),

    #[error("chunk payload of {len} bytes exceeds the {max}-byte limit")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("producer id space exhausted")]
    ProducerIdsExhausted,

    #[error("service task stopped")]
    ServiceStopped,
}
