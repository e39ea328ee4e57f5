#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use robolog_format::UnindexedReader;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to the sequential reader, which exercises the
    // whole parse path: header, tables, chunk walking, payload CRC and
    // decompression, and record delta decoding. Malformed input must come
    // back as an error, never a panic:
    // - invalid magic / truncated header or tables
    // - chunk headers running past the end of the data
    // - corrupt CRC32 or LZ4 payloads
    // - overlong or truncated varints in records
    let bytes = Bytes::copy_from_slice(data);

    if let Ok(reader) = UnindexedReader::new(bytes) {
        let init = reader.initialize();
        let _ = init.topics.len();
        let _ = reader.start();
    }
});
