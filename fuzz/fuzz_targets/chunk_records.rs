#![no_main]

use libfuzzer_sys::fuzz_target;
use robolog_format::codec::decode_chunk_records;

fuzz_target!(|data: &[u8]| {
    // The record decoder sees attacker-controlled bytes after chunk
    // decompression; it must reject garbage without panicking.
    let _ = decode_chunk_records(data, 0);
});
