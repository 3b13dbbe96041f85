//! Error Types for Traceline
//!
//! This module defines the error type shared by the buffer and service
//! crates.
//!
//! ## Error Categories
//!
//! ### Configuration Errors
//! - `InvalidConfig`: buffer constructed with an illegal size
//!
//! ### Write-Path Errors
//! - `PayloadTooLarge`: a single chunk record cannot fit the buffer even
//!   after wrapping
//!
//! ### Lookup Errors
//! - `NotFound`: a patch or lookup referenced a chunk absent from the index
//! - `OutOfBounds`: a patch offset landed outside the chunk payload
//!
//! ### Read-Path Conditions
//! - `MalformedChunk`: the parser detected invalid packet framing; the chunk
//!   stays in the store but its packets are discarded by reads
//! - `OrphanFragment`: a "continues from previous chunk" fragment arrived
//!   with no predecessor and was skipped
//!
//! The read-path conditions are policy rather than caller mistakes: the
//! buffer reports them through stats counters and keeps going. They exist as
//! error variants so the service layer can name them in logs and tests can
//! match on them.
//!
//! ## Usage
//! All fallible operations return `Result<T>`, aliased to
//! `Result<T, Error>`, so `?` propagation works throughout.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid buffer configuration: size {0} bytes (minimum 4096)")]
    InvalidConfig(usize),

    #[error("chunk record of {requested} bytes exceeds buffer capacity {capacity}")]
    PayloadTooLarge { requested: usize, capacity: usize },

    #[error("chunk {{{producer},{writer},{chunk}}} not found")]
    NotFound {
        producer: u16,
        writer: u16,
        chunk: u32,
    },

    #[error("patch offset {offset} out of bounds for payload of {payload_len} bytes")]
    OutOfBounds { offset: usize, payload_len: usize },

    #[error("malformed packet framing in chunk payload")]
    MalformedChunk,

    #[error("fragment continues from a chunk that is no longer present")]
    OrphanFragment,
}

pub type Result<T> = std::result::Result<T, Error>;
