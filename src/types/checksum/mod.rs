#![forbid(unsafe_code)]

//! CRC32 framing checksums for the record log.

/// Checksum of one store log frame: the frame tag, the recid and the payload.
pub fn record_crc32(tag: u8, recid: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[tag]);
    hasher.update(&recid.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Returns true when `expected` matches the checksum of the frame parts.
pub fn record_crc32_matches(expected: u32, tag: u8, recid: u64, payload: &[u8]) -> bool {
    record_crc32(tag, recid, payload) == expected
}
