//! Result Encoding
//!
//! Serializes decoded rows into the opaque result byte stream: a fixed
//! magic byte, marker-delimited rows and fields with XOR-obfuscated keys
//! and tagged values, and a truncated SHA-256 checksum suffix. Buffers
//! over 1 KiB are optionally zlib-compressed as a whole, checksum
//! included.
//!
//! This is reversible obfuscation plus an integrity check, not
//! cryptography.

use crate::backend::{DecodedRow, SqlValue};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::Write;

/// Leading magic byte of every encoded buffer
pub const MAGIC: u8 = 0x7F;
/// Row start marker
pub const ROW_START: u8 = 0x01;
/// Row end marker
pub const ROW_END: u8 = 0x00;
/// Key/value separator
pub const KEY_VALUE_SEP: u8 = 0x1F;
/// Field end marker
pub const FIELD_END: u8 = 0x1E;
/// XOR constant applied to every key byte
pub const KEY_MASK: u8 = 0xAA;

/// Value type tags
pub const TAG_INT: u8 = 0x02;
pub const TAG_FLOAT: u8 = 0x03;
pub const TAG_STRING: u8 = 0x04;

/// Buffers at or below this size are never compressed
const COMPRESSION_THRESHOLD: usize = 1024;

/// Encode rows into the obfuscated result stream
pub fn encode_rows(rows: &[DecodedRow], compress: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.push(MAGIC);

    for row in rows {
        buf.push(ROW_START);
        for (key, value) in row {
            for b in key.as_bytes() {
                buf.push(b ^ KEY_MASK);
            }
            buf.push(KEY_VALUE_SEP);

            match value {
                SqlValue::Int(v) => {
                    buf.push(TAG_INT);
                    buf.extend_from_slice(&(*v as u64).to_le_bytes());
                }
                SqlValue::Float(v) => {
                    buf.push(TAG_FLOAT);
                    buf.extend_from_slice(&v.to_bits().to_le_bytes());
                }
                SqlValue::Text(v) => {
                    buf.push(TAG_STRING);
                    buf.extend_from_slice(v.as_bytes());
                }
            }
            buf.push(FIELD_END);
        }
        buf.push(ROW_END);
    }

    let checksum = Sha256::digest(&buf);
    buf.extend_from_slice(&checksum[..4]);

    if compress && buf.len() > COMPRESSION_THRESHOLD {
        compress_buffer(&buf)
    } else {
        buf
    }
}

fn compress_buffer(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(data).is_err() {
        return data.to_vec();
    }
    encoder.finish().unwrap_or_else(|_| data.to_vec())
}
