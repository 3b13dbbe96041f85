#![no_main]

use libfuzzer_sys::fuzz_target;
use traceline_core::packet::{PacketParser, ParseStep};
use traceline_core::varint;

fuzz_target!(|data: &[u8]| {
    // Fuzz the packet parser with arbitrary chunk payloads.
    // Tests handling of:
    // - Truncated and overlong varint prefixes
    // - Lengths running past the payload
    // - Zero-length sentinels
    // - Guaranteed forward progress on garbage
    let mut parser = PacketParser::new(data);
    let mut packets = 0usize;
    loop {
        match parser.next_packet() {
            ParseStep::Packet(p) => {
                assert!(p.len() <= data.len());
                packets += 1;
                // A payload of n bytes can hold at most n + 1 packets
                // (all zero-length would still need one prefix byte each).
                assert!(packets <= data.len() + 1, "parser failed to make progress");
            }
            ParseStep::Eof | ParseStep::Malformed => break,
        }
    }

    // Also fuzz the raw varint decoder; it must never panic and never
    // report more bytes consumed than exist.
    if let Some((_, consumed)) = varint::decode_u64(data) {
        assert!(consumed <= data.len());
    }

    // Resuming from any offset must be equally panic-free.
    if !data.is_empty() {
        let offset = data[0] as usize;
        let mut resumed = PacketParser::at_offset(data, offset);
        let _ = resumed.next_packet();
    }
});
