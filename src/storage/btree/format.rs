//! Record encoding for nodes and the root pointer.
//!
//! ```text
//! node := flags:u8 | link:varint | key_count:varint | key* | payload
//! key  := len:varint | bytes
//! payload (directory) := child_count:varint | child_recid:varint*
//! payload (leaf)      := value_count:varint | slot*
//! slot := 0x00 | len:varint | bytes     (inline value)
//!       | 0x01 | recid:varint           (out-of-line value record)
//! ```

use super::codecs::{KeyCodec, ValCodec};
use super::node::{Node, NodeBody, NodeFlags, ValueSlot};
use crate::primitives::bytes::buf::{put_len_prefixed, Reader};
use crate::primitives::bytes::var;
use crate::types::{BLinkError, RecId, Result};

const SLOT_INLINE: u8 = 0;
const SLOT_RECORD: u8 = 1;
const KNOWN_FLAGS: u8 = NodeFlags::LEFT_EDGE
    | NodeFlags::RIGHT_EDGE
    | NodeFlags::LAST_KEY_DOUBLE
    | NodeFlags::DIRECTORY;

pub(crate) fn encode_node<K: KeyCodec, V: ValCodec>(node: &Node<K, V>) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + node.keys.len() * 12);
    let mut flags = node.flags.bits();
    if !node.is_leaf() {
        flags |= NodeFlags::DIRECTORY;
    }
    out.push(flags);
    var::encode_u64(node.link.0, &mut out);
    var::encode_u64(node.keys.len() as u64, &mut out);
    let mut scratch = Vec::new();
    for key in &node.keys {
        scratch.clear();
        K::encode_key(key, &mut scratch);
        put_len_prefixed(&mut out, &scratch);
    }
    match &node.body {
        NodeBody::Directory { children } => {
            var::encode_u64(children.len() as u64, &mut out);
            for child in children {
                var::encode_u64(child.0, &mut out);
            }
        }
        NodeBody::Leaf { values } => {
            var::encode_u64(values.len() as u64, &mut out);
            for slot in values {
                match slot {
                    ValueSlot::Inline(value) => {
                        out.push(SLOT_INLINE);
                        scratch.clear();
                        V::encode_val(value, &mut scratch);
                        put_len_prefixed(&mut out, &scratch);
                    }
                    ValueSlot::Record(recid) => {
                        out.push(SLOT_RECORD);
                        var::encode_u64(recid.0, &mut out);
                    }
                }
            }
        }
    }
    out
}

pub(crate) fn decode_node<K: KeyCodec, V: ValCodec>(bytes: &[u8]) -> Result<Node<K, V>> {
    let mut reader = Reader::new(bytes);
    let raw_flags = reader.u8()?;
    if raw_flags & !KNOWN_FLAGS != 0 {
        return Err(BLinkError::corruption(format!(
            "unknown node flag bits {raw_flags:#04x}"
        )));
    }
    let directory = raw_flags & NodeFlags::DIRECTORY != 0;
    let flags = NodeFlags::from_bits(raw_flags & !NodeFlags::DIRECTORY);
    let link = RecId(reader.varint()?);
    let key_count = reader.varint_len()?;
    if key_count > reader.remaining() {
        return Err(BLinkError::corruption("node key count exceeds record size"));
    }
    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(K::decode_key(reader.len_prefixed()?)?);
    }
    let payload_count = reader.varint_len()?;
    if payload_count > reader.remaining() {
        return Err(BLinkError::corruption("node payload count exceeds record size"));
    }
    let body = if directory {
        let mut children = Vec::with_capacity(payload_count);
        for _ in 0..payload_count {
            let child = RecId(reader.varint()?);
            if child.is_null() {
                return Err(BLinkError::corruption("directory child is the null recid"));
            }
            children.push(child);
        }
        NodeBody::Directory { children }
    } else {
        let mut values = Vec::with_capacity(payload_count);
        for _ in 0..payload_count {
            let slot = match reader.u8()? {
                SLOT_INLINE => ValueSlot::Inline(V::decode_val(reader.len_prefixed()?)?),
                SLOT_RECORD => ValueSlot::Record(RecId(reader.varint()?)),
                other => {
                    return Err(BLinkError::corruption(format!(
                        "unknown leaf slot tag {other}"
                    )))
                }
            };
            values.push(slot);
        }
        NodeBody::Leaf { values }
    };
    if reader.remaining() != 0 {
        return Err(BLinkError::corruption("trailing bytes after node record"));
    }
    let node = Node {
        flags,
        keys,
        link,
        body,
    };
    if node.payload_len() != node.expected_payload_len() {
        return Err(BLinkError::corruption(format!(
            "node holds {} slots but its keys and flags imply {}",
            node.payload_len(),
            node.expected_payload_len()
        )));
    }
    if !node.is_right_edge() && node.link.is_null() {
        return Err(BLinkError::corruption("non-right-edge node without link"));
    }
    Ok(node)
}

pub(crate) fn encode_root_pointer(root: RecId) -> [u8; 8] {
    root.0.to_be_bytes()
}

pub(crate) fn decode_root_pointer(bytes: &[u8]) -> Result<RecId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BLinkError::corruption("root pointer record is not 8 bytes"))?;
    let root = RecId(u64::from_be_bytes(raw));
    if root.is_null() {
        return Err(BLinkError::corruption("root pointer is null"));
    }
    Ok(root)
}

pub(crate) fn encode_value<V: ValCodec>(value: &V) -> Vec<u8> {
    let mut out = Vec::new();
    V::encode_val(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_with_mixed_slots_decodes_identically() -> Result<()> {
        let node: Node<String, Vec<u8>> = Node {
            flags: NodeFlags::from_bits(NodeFlags::LAST_KEY_DOUBLE),
            keys: vec!["b".into(), "c".into(), "d".into()],
            link: RecId(12),
            body: NodeBody::Leaf {
                values: vec![ValueSlot::Inline(b"cv".to_vec()), ValueSlot::Record(RecId(40))],
            },
        };
        let bytes = encode_node(&node);
        assert_eq!(decode_node::<String, Vec<u8>>(&bytes)?, node);
        Ok(())
    }

    #[test]
    fn directory_flag_selects_body_kind() -> Result<()> {
        let node: Node<u64, u64> = Node::new_root(50, RecId(3), RecId(4));
        let bytes = encode_node(&node);
        assert_ne!(bytes[0] & NodeFlags::DIRECTORY, 0);
        let decoded = decode_node::<u64, u64>(&bytes)?;
        assert!(!decoded.is_leaf());
        assert_eq!(decoded.children(), &[RecId(3), RecId(4)]);
        Ok(())
    }

    #[test]
    fn malformed_records_are_corruption() {
        let node: Node<u64, u64> = Node::new_root(50, RecId(3), RecId(4));
        let bytes = encode_node(&node);

        let truncated = &bytes[..bytes.len() - 1];
        assert!(decode_node::<u64, u64>(truncated).unwrap_err().is_corruption());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(decode_node::<u64, u64>(&trailing).unwrap_err().is_corruption());

        let mut bad_flags = bytes.clone();
        bad_flags[0] |= 0x80;
        assert!(decode_node::<u64, u64>(&bad_flags).unwrap_err().is_corruption());

        // A non-edge leaf with a single key cannot carry a value.
        let mut out = vec![0u8];
        var::encode_u64(9, &mut out);
        var::encode_u64(1, &mut out);
        put_len_prefixed(&mut out, &7u64.to_be_bytes());
        var::encode_u64(1, &mut out);
        out.push(SLOT_INLINE);
        put_len_prefixed(&mut out, &7u64.to_be_bytes());
        assert!(decode_node::<u64, u64>(&out).unwrap_err().is_corruption());

        assert!(decode_node::<u64, u64>(&[]).unwrap_err().is_corruption());
    }

    #[test]
    fn root_pointer_rejects_null_and_short_records() {
        assert_eq!(decode_root_pointer(&encode_root_pointer(RecId(5))).unwrap(), RecId(5));
        assert!(decode_root_pointer(&[0; 8]).unwrap_err().is_corruption());
        assert!(decode_root_pointer(&[1, 2]).unwrap_err().is_corruption());
    }
}
