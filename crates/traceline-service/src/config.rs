//! Service Configuration
//!
//! Configuration for the tracing service and the buffer it owns.
//!
//! ## ServiceConfig
//!
//! - **buffer_size_bytes**: trace buffer capacity. Rounded up to a multiple
//!   of 16 by the buffer; must be at least 4 KiB (default: 4 MiB)
//! - **read_batch_max_packets**: upper bound on packets returned by a single
//!   consumer read request (default: 1024)
//! - **channel_capacity**: depth of the service command channel; producers
//!   briefly await channel space when the service task falls behind
//!   (default: 256)
//!
//! ## Usage
//!
//! ```ignore
//! use traceline_service::ServiceConfig;
//!
//! // Production config
//! let config = ServiceConfig {
//!     buffer_size_bytes: 32 * 1024 * 1024,
//!     ..Default::default()
//! };
//!
//! // Test config: tiny buffer to exercise wrapping
//! let config = ServiceConfig {
//!     buffer_size_bytes: 4096,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Largest chunk payload the service accepts from a producer. The buffer
/// itself only enforces its capacity; this bound keeps one producer from
/// monopolizing the whole region with a single chunk.
pub const MAX_CHUNK_PAYLOAD: usize = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Trace buffer capacity in bytes (default: 4 MiB)
    #[serde(default = "default_buffer_size_bytes")]
    pub buffer_size_bytes: usize,

    /// Maximum packets returned by one read request (default: 1024)
    #[serde(default = "default_read_batch_max_packets")]
    pub read_batch_max_packets: usize,

    /// Command channel depth (default: 256)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            buffer_size_bytes: default_buffer_size_bytes(),
            read_batch_max_packets: default_read_batch_max_packets(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_buffer_size_bytes() -> usize {
    4 * 1024 * 1024 // 4 MiB
}

fn default_read_batch_max_packets() -> usize {
    1024
}

fn default_channel_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.buffer_size_bytes, 4 * 1024 * 1024);
        assert_eq!(config.read_batch_max_packets, 1024);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.buffer_size_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_roundtrip() {
        let config = ServiceConfig {
            buffer_size_bytes: 4096,
            read_batch_max_packets: 16,
            channel_capacity: 4,
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: ServiceConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.buffer_size_bytes, 4096);
        assert_eq!(back.read_batch_max_packets, 16);
        assert_eq!(back.channel_capacity, 4);
    }

    #[test]
    fn test_partial_override() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"buffer_size_bytes": 8192}"#).expect("deserialize");
        assert_eq!(config.buffer_size_bytes, 8192);
        assert_eq!(config.read_batch_max_packets, 1024);
    }
}
