#![forbid(unsafe_code)]
//! Encoding, varint, and buffer utilities shared by codecs and the node format.

pub mod ord {
    //! Order-preserving encoders for numeric keys.

    const SIGN_BIT: u64 = 1 << 63;

    /// Big-endian bytes of `v`; byte order equals numeric order.
    pub fn u64_be(v: u64) -> [u8; 8] {
        v.to_be_bytes()
    }

    /// Big-endian bytes of `v` with the sign bit flipped so that negative
    /// values sort before positive ones.
    pub fn i64_be(v: i64) -> [u8; 8] {
        ((v as u64) ^ SIGN_BIT).to_be_bytes()
    }

    /// Inverse of [`i64_be`].
    pub fn i64_from_be(bytes: [u8; 8]) -> i64 {
        (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
    }
}

pub mod var {
    //! Unsigned LEB128 varints.

    use crate::types::{BLinkError, Result};

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// Decodes a varint starting at `*off`, advancing the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let byte = *src
                .get(*off)
                .ok_or_else(|| BLinkError::corruption("varint truncated"))?;
            *off += 1;
            let payload = u64::from(byte & 0x7f);
            if i == 9 && payload > 1 {
                return Err(BLinkError::corruption("varint overflows 64 bits"));
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(BLinkError::corruption("varint longer than 10 bytes"))
    }
}

pub mod buf {
    //! A slice-backed reader whose overreads surface as corruption.

    use core::fmt;

    use super::var;
    use crate::types::{BLinkError, Result};

    /// Reads bytes from a slice with offset tracking.
    pub struct Reader<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Reader<'a> {
        /// Creates a reader positioned at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .filter(|end| *end <= self.buf.len())
                .ok_or_else(|| {
                    BLinkError::corruption(format!(
                        "record truncated: need {n} bytes, {} remaining",
                        self.remaining()
                    ))
                })?;
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Takes a single byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Takes a varint.
        pub fn varint(&mut self) -> Result<u64> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Takes a varint and narrows it to `usize`.
        pub fn varint_len(&mut self) -> Result<usize> {
            let raw = self.varint()?;
            usize::try_from(raw).map_err(|_| BLinkError::corruption("length exceeds usize"))
        }

        /// Takes a varint length prefix followed by that many bytes.
        pub fn len_prefixed(&mut self) -> Result<&'a [u8]> {
            let len = self.varint_len()?;
            self.take(len)
        }

        /// Number of unread bytes.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }
    }

    impl fmt::Debug for Reader<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Reader")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }

    /// Appends a varint length prefix followed by `bytes`.
    pub fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
        var::encode_u64(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }
}
