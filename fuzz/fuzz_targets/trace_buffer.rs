#![no_main]

use libfuzzer_sys::fuzz_target;
use traceline_buffer::TraceBuffer;

fn take<'a>(input: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if input.len() < n {
        return None;
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Some(head)
}

// Drive the whole buffer with an attacker-controlled operation stream:
// appends with arbitrary ids/flags/packet counts/payloads, patches at
// arbitrary offsets, and interleaved read passes. The buffer must never
// panic, never hand out a slice outside the store, and always terminate.
fuzz_target!(|data: &[u8]| {
    let mut buffer = match TraceBuffer::new(4096) {
        Ok(b) => b,
        Err(_) => return,
    };
    buffer.set_suppress_sanity_checks(true);

    let mut input = data;
    while let Some(op) = take(&mut input, 1) {
        match op[0] % 3 {
            0 => {
                let Some(h) = take(&mut input, 7) else { break };
                let producer = u16::from_le_bytes([h[0], 1]);
                let writer = u16::from_le_bytes([h[1], 1]);
                let chunk = u32::from_le_bytes([h[2], h[3], 0, 0]);
                let flags = h[4];
                let num_packets = u16::from_le_bytes([h[5], 0]);
                let len = (h[6] as usize * 8).min(input.len());
                let Some(payload) = take(&mut input, len) else {
                    break;
                };
                let _ = buffer.append_chunk(producer, writer, chunk, flags, num_packets, payload);
            }
            1 => {
                let Some(h) = take(&mut input, 9) else { break };
                let producer = u16::from_le_bytes([h[0], 1]);
                let writer = u16::from_le_bytes([h[1], 1]);
                let chunk = u32::from_le_bytes([h[2], h[3], 0, 0]);
                let offset = usize::from(u16::from_le_bytes([h[4], h[5]]));
                let patch = [h[6], h[7], h[8], 0x42];
                let _ = buffer.apply_patch(producer, writer, chunk, offset, patch);
            }
            _ => {
                buffer.begin_read();
                for _ in 0..64 {
                    match buffer.read_next_packet() {
                        Some(packet) => {
                            let _ = packet.to_vec();
                        }
                        None => break,
                    }
                }
            }
        }
    }
});
