use std::cmp::Ordering;

use crate::primitives::bytes::ord;
use crate::types::{BLinkError, Result};

/// Trait implemented by key types stored in the tree.
///
/// `compare` is the tree's comparator; encoded bytes are only used for
/// persistence, so the encoding need not be order-preserving.
pub trait KeyCodec: Clone + Send + Sync + 'static {
    /// Encode `key` into `out`.
    fn encode_key(key: &Self, out: &mut Vec<u8>);

    /// Decode a key from its encoded representation.
    fn decode_key(bytes: &[u8]) -> Result<Self>;

    /// Total order used for every search inside the tree.
    fn compare(a: &Self, b: &Self) -> Ordering;
}

/// Trait implemented by value types stored in the tree.
pub trait ValCodec: Clone + Send + Sync + 'static {
    /// Encode `value` into `out`.
    fn encode_val(value: &Self, out: &mut Vec<u8>);

    /// Decode a value from `src`.
    fn decode_val(src: &[u8]) -> Result<Self>;

    /// Equality used by compare-and-remove and compare-and-replace.
    /// Defaults to comparing encodings.
    fn same_value(a: &Self, b: &Self) -> bool {
        let mut left = Vec::new();
        let mut right = Vec::new();
        Self::encode_val(a, &mut left);
        Self::encode_val(b, &mut right);
        left == right
    }
}

fn fixed8(bytes: &[u8], what: &str) -> Result<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| BLinkError::corruption(format!("{what} length mismatch")))
}

impl KeyCodec for u64 {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ord::u64_be(*key));
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        Ok(u64::from_be_bytes(fixed8(bytes, "u64 key")?))
    }

    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl ValCodec for u64 {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        Ok(u64::from_be_bytes(fixed8(src, "u64 value")?))
    }

    fn same_value(a: &Self, b: &Self) -> bool {
        a == b
    }
}

impl KeyCodec for i64 {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ord::i64_be(*key));
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        Ok(ord::i64_from_be(fixed8(bytes, "i64 key")?))
    }

    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl ValCodec for i64 {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        Ok(i64::from_be_bytes(fixed8(src, "i64 value")?))
    }

    fn same_value(a: &Self, b: &Self) -> bool {
        a == b
    }
}

impl KeyCodec for Vec<u8> {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(key);
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }

    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl ValCodec for Vec<u8> {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(value);
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        Ok(src.to_vec())
    }
}

impl KeyCodec for String {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(key.as_bytes());
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BLinkError::corruption("string key is not valid UTF-8"))
    }

    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }
}

impl ValCodec for String {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(value.as_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        String::from_utf8(src.to_vec())
            .map_err(|_| BLinkError::corruption("string value is not valid UTF-8"))
    }
}
