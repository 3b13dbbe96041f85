//! Minimal end-to-end demo: two producers write packets (one of them
//! fragmented across chunks and patched after the fact), a consumer drains
//! them, and the buffer stats are printed.
//!
//! Run with: cargo run -p traceline-service --example demo

use bytes::Bytes;
use traceline_buffer::chunk_flags::{
    FIRST_PACKET_CONTINUES_FROM_PREV, LAST_PACKET_CONTINUES_ON_NEXT,
};
use traceline_core::packet::encode_packet;
use traceline_service::{ServiceConfig, TracingService};

fn payload_of(packets: &[&[u8]]) -> Bytes {
    let mut buf = Vec::new();
    for p in packets {
        encode_packet(&mut buf, p);
    }
    Bytes::from(buf)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,traceline_buffer=debug".into()),
        )
        .init();

    let service = TracingService::spawn(ServiceConfig {
        buffer_size_bytes: 64 * 1024,
        ..Default::default()
    })?;

    // Producer 1: plain packets.
    let producer1 = service.register_producer().await?;
    let mut writer1 = producer1.create_writer().await?;
    for i in 0..3u8 {
        writer1
            .submit_chunk(0, 1, payload_of(&[format!("event-{i}").as_bytes()]))
            .await?;
    }

    // Producer 2: one packet fragmented over two chunks, with a 4-byte
    // placeholder patched in after both chunks were committed.
    let producer2 = service.register_producer().await?;
    let mut writer2 = producer2.create_writer().await?;
    writer2
        .submit_chunk(
            LAST_PACKET_CONTINUES_ON_NEXT,
            1,
            payload_of(&[b"span:\0\0\0\0"]),
        )
        .await?;
    writer2
        .submit_chunk(
            FIRST_PACKET_CONTINUES_FROM_PREV,
            1,
            payload_of(&[b":end"]),
        )
        .await?;
    producer2.submit_patch(writer2.writer_id(), 0, 6, *b"1234").await?;

    for packet in service.read_packets(64).await? {
        println!(
            "packet from {{{},{},{}}}: {:?}",
            packet.producer_id,
            packet.writer_id,
            packet.chunk_id,
            String::from_utf8_lossy(&packet.data),
        );
    }

    let stats = service.stats().await?;
    println!(
        "stats: {} chunks written, {} patches applied, {} readaheads",
        stats.chunks_written, stats.patches_applied, stats.readaheads_succeeded
    );
    Ok(())
}
