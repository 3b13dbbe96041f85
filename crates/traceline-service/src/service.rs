//! The Tracing Service Task
//!
//! One tokio task owns the [`TraceBuffer`]; everything else talks to it
//! through cloneable handles over an mpsc command channel. This realizes
//! the buffer's concurrency contract: producers submit concurrently, but
//! the buffer only ever observes a single well-ordered stream of calls,
//! each completing synchronously on the owning task.
//!
//! ```text
//! ProducerHandle ──┐
//! ChunkWriter ─────┼── mpsc ──► service task ──► TraceBuffer
//! ServiceHandle ───┘            (single owner)
//! ```
//!
//! ## Identity assignment
//!
//! Producer and writer ids are assigned by the service, never chosen by
//! producers: [`ServiceHandle::register_producer`] yields a
//! [`ProducerHandle`] carrying a fresh producer id, and
//! [`ProducerHandle::create_writer`] yields a [`ChunkWriter`] with a fresh
//! writer id within that producer. Chunk ids are the writer's own counter,
//! wrapping modulo the chunk-id space — exactly the contract the buffer's
//! modular index ordering expects.
//!
//! ## Reads copy
//!
//! Inside the buffer, packets are yielded as slices borrowing the store.
//! Handing those across a task boundary would race with later appends, so
//! the service task copies each packet into owned [`bytes::Bytes`] before
//! replying. Consumers therefore get stable data at the cost of one copy —
//! the policy the buffer's snapshot rule prescribes.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use traceline_buffer::{BufferStats, TraceBuffer, PATCH_LEN};
use traceline_core::ids::{ChunkId, ProducerId, WriterId};

use crate::config::{ServiceConfig, MAX_CHUNK_PAYLOAD};
use crate::error::{Error, Result};

/// One complete trace packet, copied out of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketData {
    pub producer_id: ProducerId,
    pub writer_id: WriterId,
    /// Chunk holding the packet's first byte.
    pub chunk_id: ChunkId,
    pub data: Bytes,
}

enum Command {
    RegisterProducer {
        reply: oneshot::Sender<Result<ProducerId>>,
    },
    RegisterWriter {
        producer_id: ProducerId,
        reply: oneshot::Sender<Result<WriterId>>,
    },
    SubmitChunk {
        producer_id: ProducerId,
        writer_id: WriterId,
        chunk_id: ChunkId,
        flags: u8,
        num_packets: u16,
        payload: Bytes,
        reply: oneshot::Sender<Result<usize>>,
    },
    SubmitPatch {
        producer_id: ProducerId,
        writer_id: WriterId,
        chunk_id: ChunkId,
        offset: usize,
        patch: [u8; PATCH_LEN],
        reply: oneshot::Sender<bool>,
    },
    ReadPackets {
        max_packets: usize,
        reply: oneshot::Sender<Vec<PacketData>>,
    },
    Stats {
        reply: oneshot::Sender<BufferStats>,
    },
}

/// The tracing service. Spawn it once, then hand out clones of the
/// returned [`ServiceHandle`].
pub struct TracingService;

impl TracingService {
    /// Validate the configuration, allocate the buffer and spawn the
    /// owning task. The task exits when the last handle is dropped.
    pub fn spawn(config: ServiceConfig) -> Result<ServiceHandle> {
        let buffer = TraceBuffer::new(config.buffer_size_bytes)?;
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let capacity = buffer.capacity();
        tokio::spawn(run(buffer, config.clone(), rx));
        info!(
            buffer_size = capacity,
            channel_capacity = config.channel_capacity,
            "tracing service started"
        );
        Ok(ServiceHandle { tx })
    }
}

/// State the service task keeps besides the buffer itself.
struct ServiceState {
    buffer: TraceBuffer,
    config: ServiceConfig,
    next_producer_id: ProducerId,
    /// Next writer id per registered producer.
    writer_counters: std::collections::HashMap<ProducerId, WriterId>,
}

async fn run(buffer: TraceBuffer, config: ServiceConfig, mut rx: mpsc::Receiver<Command>) {
    let mut state = ServiceState {
        buffer,
        config,
        next_producer_id: 1,
        writer_counters: std::collections::HashMap::new(),
    };
    while let Some(command) = rx.recv().await {
        state.handle(command);
    }
    debug!("tracing service task stopped");
}

impl ServiceState {
    fn handle(&mut self, command: Command) {
        match command {
            Command::RegisterProducer { reply } => {
                let _ = reply.send(self.register_producer());
            }
            Command::RegisterWriter { producer_id, reply } => {
                let _ = reply.send(self.register_writer(producer_id));
            }
            Command::SubmitChunk {
                producer_id,
                writer_id,
                chunk_id,
                flags,
                num_packets,
                payload,
                reply,
            } => {
                let result = self
                    .buffer
                    .append_chunk(producer_id, writer_id, chunk_id, flags, num_packets, &payload)
                    .map_err(Error::from);
                let _ = reply.send(result);
            }
            Command::SubmitPatch {
                producer_id,
                writer_id,
                chunk_id,
                offset,
                patch,
                reply,
            } => {
                let applied = self
                    .buffer
                    .apply_patch(producer_id, writer_id, chunk_id, offset, patch);
                let _ = reply.send(applied);
            }
            Command::ReadPackets { max_packets, reply } => {
                let _ = reply.send(self.read_packets(max_packets));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.buffer.stats());
            }
        }
    }

    fn register_producer(&mut self) -> Result<ProducerId> {
        if self.next_producer_id == ProducerId::MAX {
            warn!("producer id space exhausted");
            return Err(Error::ProducerIdsExhausted);
        }
        let id = self.next_producer_id;
        self.next_producer_id += 1;
        self.writer_counters.insert(id, 1);
        debug!(producer = id, "registered producer");
        Ok(id)
    }

    fn register_writer(&mut self, producer_id: ProducerId) -> Result<WriterId> {
        let counter = self
            .writer_counters
            .get_mut(&producer_id)
            .ok_or(Error::ServiceStopped)?;
        if *counter == WriterId::MAX {
            return Err(Error::ProducerIdsExhausted);
        }
        let id = *counter;
        *counter += 1;
        debug!(producer = producer_id, writer = id, "registered writer");
        Ok(id)
    }

    fn read_packets(&mut self, max_packets: usize) -> Vec<PacketData> {
        let max = max_packets.min(self.config.read_batch_max_packets);
        let mut out = Vec::new();
        self.buffer.begin_read();
        while out.len() < max {
            let Some(packet) = self.buffer.read_next_packet() else {
                break;
            };
            out.push(PacketData {
                producer_id: packet.producer_id,
                writer_id: packet.writer_id,
                chunk_id: packet.chunk_id,
                data: Bytes::from(packet.to_vec()),
            });
        }
        out
    }
}

/// Cheap-to-clone handle to the service task.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Command>,
}

impl ServiceHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        reply_rx.await.map_err(|_| Error::ServiceStopped)
    }

    /// Register a producer, obtaining its service-assigned id.
    pub async fn register_producer(&self) -> Result<ProducerHandle> {
        let producer_id = self
            .request(|reply| Command::RegisterProducer { reply })
            .await??;
        Ok(ProducerHandle {
            producer_id,
            handle: self.clone(),
        })
    }

    /// Drain up to `max_packets` complete packets, copied out of the
    /// buffer. Packets already delivered are never delivered again.
    pub async fn read_packets(&self, max_packets: usize) -> Result<Vec<PacketData>> {
        self.request(|reply| Command::ReadPackets { max_packets, reply })
            .await
    }

    /// Snapshot of the buffer's stats counters.
    pub async fn stats(&self) -> Result<BufferStats> {
        self.request(|reply| Command::Stats { reply }).await
    }
}

/// A registered producer. Creates writers and submits patches.
#[derive(Clone)]
pub struct ProducerHandle {
    producer_id: ProducerId,
    handle: ServiceHandle,
}

impl ProducerHandle {
    pub fn producer_id(&self) -> ProducerId {
        self.producer_id
    }

    /// Create a new writer: one ordered stream of chunks.
    pub async fn create_writer(&self) -> Result<ChunkWriter> {
        let writer_id = self
            .handle
            .request(|reply| Command::RegisterWriter {
                producer_id: self.producer_id,
                reply,
            })
            .await??;
        Ok(ChunkWriter {
            producer_id: self.producer_id,
            writer_id,
            next_chunk_id: 0,
            handle: self.handle.clone(),
        })
    }

    /// Overwrite 4 placeholder bytes inside an already-submitted chunk.
    /// Returns `false` when the chunk is gone or the offset is out of
    /// bounds.
    pub async fn submit_patch(
        &self,
        writer_id: WriterId,
        chunk_id: ChunkId,
        offset: usize,
        patch: [u8; PATCH_LEN],
    ) -> Result<bool> {
        self.handle
            .request(|reply| Command::SubmitPatch {
                producer_id: self.producer_id,
                writer_id,
                chunk_id,
                offset,
                patch,
                reply,
            })
            .await
    }
}

/// One ordered chunk stream. Chunk ids are assigned sequentially and wrap
/// modulo the chunk-id space.
pub struct ChunkWriter {
    producer_id: ProducerId,
    writer_id: WriterId,
    next_chunk_id: ChunkId,
    handle: ServiceHandle,
}

impl ChunkWriter {
    pub fn producer_id(&self) -> ProducerId {
        self.producer_id
    }

    pub fn writer_id(&self) -> WriterId {
        self.writer_id
    }

    /// Chunk id the next `submit_chunk` call will use.
    pub fn next_chunk_id(&self) -> ChunkId {
        self.next_chunk_id
    }

    /// Submit the next chunk in this writer's sequence. Returns the bytes
    /// the record consumed in the buffer.
    pub async fn submit_chunk(
        &mut self,
        flags: u8,
        num_packets: u16,
        payload: Bytes,
    ) -> Result<usize> {
        if payload.len() > MAX_CHUNK_PAYLOAD {
            return Err(Error::ChunkTooLarge {
                len: payload.len(),
                max: MAX_CHUNK_PAYLOAD,
            });
        }
        let chunk_id = self.next_chunk_id;
        let consumed = self
            .handle
            .request(|reply| Command::SubmitChunk {
                producer_id: self.producer_id,
                writer_id: self.writer_id,
                chunk_id,
                flags,
                num_packets,
                payload,
                reply,
            })
            .await??;
        self.next_chunk_id = self.next_chunk_id.wrapping_add(1);
        Ok(consumed)
    }
}
