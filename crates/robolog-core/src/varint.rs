//! Variable-length Integer Encoding
//!
//! Chunk payloads delta-encode timestamps and lengths as varints: each byte
//! carries 7 bits of data plus a continuation flag, so small values use one
//! byte instead of eight. Signed values go through ZigZag first
//! (0 → 0, -1 → 1, 1 → 2, ...) so small negative time deltas stay compact.
//!
//! Records in a recording arrive at millisecond-ish spacing, which makes
//! time deltas small; combined with per-chunk compression this is where
//! most of the on-disk savings come from.
//!
//! Decoding is fallible: recordings come from disk or the network and may
//! be truncated or corrupt, so running out of bytes or overflowing 64 bits
//! is an `InvalidRecording` error, never a panic.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Encode a signed integer (ZigZag + varint).
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    let unsigned = ((value << 1) ^ (value >> 63)) as u64;
    encode_varint_u64(buf, unsigned);
}

/// Encode an unsigned integer as a varint.
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a signed integer (varint + ZigZag).
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    let unsigned = decode_varint_u64(buf)?;

    let value = (unsigned >> 1) as i64;
    if (unsigned & 1) != 0 {
        Ok(!value)
    } else {
        Ok(value)
    }
}

/// Decode an unsigned varint.
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(Error::InvalidRecording("truncated varint".to_string()));
        }

        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(value);
        }

        shift += 7;

        if shift >= 64 {
            return Err(Error::InvalidRecording("varint overflows u64".to_string()));
        }
    }
}
