use crate::buffer::{PageId, PAGE_SIZE};
use crate::error::{PlumeError, PlumeResult};
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::{InternalNode, LeafNode, RecordId, INTERNAL_CAP, LEAF_CAP};

pub struct RidCodec;

impl RidCodec {
    pub fn encode(rid: &RecordId) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend(CommonCodec::encode_u32(rid.page_number));
        bytes.extend(CommonCodec::encode_u32(rid.slot_number));
        bytes
    }

    pub fn decode(bytes: &[u8]) -> PlumeResult<DecodedData<RecordId>> {
        let (page_number, offset) = CommonCodec::decode_u32(bytes)?;
        let (slot_number, offset2) = CommonCodec::decode_u32(&bytes[offset..])?;
        Ok((RecordId::new(page_number, slot_number), offset + offset2))
    }
}

/// Leaf page image: `key_array` at offset 0, `rid_array` after it, the
/// right-sibling id in the trailing word. The occupied prefix ends at
/// the first rid whose `page_number` is zero; encoding from a zeroed
/// image keeps that sentinel in every unused slot.
pub struct LeafNodeCodec;

const LEAF_RID_BASE: usize = LEAF_CAP * 4;
const LEAF_SIBLING_OFFSET: usize = PAGE_SIZE - 4;

impl LeafNodeCodec {
    pub fn encode(node: &LeafNode) -> Vec<u8> {
        debug_assert_eq!(node.keys.len(), node.rids.len());
        debug_assert!(node.keys.len() <= LEAF_CAP);
        let mut bytes = vec![0u8; PAGE_SIZE];
        for (i, key) in node.keys.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&CommonCodec::encode_i32(*key));
        }
        for (i, rid) in node.rids.iter().enumerate() {
            let at = LEAF_RID_BASE + i * 8;
            bytes[at..at + 8].copy_from_slice(&RidCodec::encode(rid));
        }
        bytes[LEAF_SIBLING_OFFSET..]
            .copy_from_slice(&CommonCodec::encode_u32(node.right_sibling));
        bytes
    }

    pub fn decode(bytes: &[u8]) -> PlumeResult<DecodedData<LeafNode>> {
        check_page_len(bytes)?;
        let mut keys = Vec::new();
        let mut rids = Vec::new();
        for i in 0..LEAF_CAP {
            let (rid, _) = RidCodec::decode(&bytes[LEAF_RID_BASE + i * 8..])?;
            if !rid.is_valid() {
                break;
            }
            let (key, _) = CommonCodec::decode_i32(&bytes[i * 4..])?;
            keys.push(key);
            rids.push(rid);
        }
        let (right_sibling, _) = CommonCodec::decode_u32(&bytes[LEAF_SIBLING_OFFSET..])?;
        Ok((
            LeafNode {
                keys,
                rids,
                right_sibling,
            },
            PAGE_SIZE,
        ))
    }
}

/// Internal page image: level word, `key_array`, then `child_array`.
/// The child prefix ends at the first zero entry (page 0 is the header
/// page and never a child).
pub struct InternalNodeCodec;

const INTERNAL_KEY_BASE: usize = 4;
const INTERNAL_CHILD_BASE: usize = 4 + INTERNAL_CAP * 4;

impl InternalNodeCodec {
    pub fn encode(node: &InternalNode) -> Vec<u8> {
        debug_assert!(node.keys.len() <= INTERNAL_CAP);
        debug_assert!(node.children.len() <= INTERNAL_CAP + 1);
        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(&CommonCodec::encode_i32(node.level));
        for (i, key) in node.keys.iter().enumerate() {
            let at = INTERNAL_KEY_BASE + i * 4;
            bytes[at..at + 4].copy_from_slice(&CommonCodec::encode_i32(*key));
        }
        for (i, child) in node.children.iter().enumerate() {
            let at = INTERNAL_CHILD_BASE + i * 4;
            bytes[at..at + 4].copy_from_slice(&CommonCodec::encode_u32(*child));
        }
        bytes
    }

    pub fn decode(bytes: &[u8]) -> PlumeResult<DecodedData<InternalNode>> {
        check_page_len(bytes)?;
        let (level, _) = CommonCodec::decode_i32(bytes)?;
        if level < 1 {
            return Err(PlumeError::Storage(format!(
                "internal page has level {}",
                level
            )));
        }
        let mut children: Vec<PageId> = Vec::new();
        for i in 0..=INTERNAL_CAP {
            let (child, _) = CommonCodec::decode_u32(&bytes[INTERNAL_CHILD_BASE + i * 4..])?;
            if child == 0 {
                break;
            }
            children.push(child);
        }
        let key_count = children.len().saturating_sub(1);
        let mut keys = Vec::with_capacity(key_count);
        for i in 0..key_count {
            let (key, _) = CommonCodec::decode_i32(&bytes[INTERNAL_KEY_BASE + i * 4..])?;
            keys.push(key);
        }
        Ok((
            InternalNode {
                level,
                keys,
                children,
            },
            PAGE_SIZE,
        ))
    }
}

fn check_page_len(bytes: &[u8]) -> PlumeResult<()> {
    if bytes.len() != PAGE_SIZE {
        return Err(PlumeError::Storage(format!(
            "index page size is {} instead of {}",
            bytes.len(),
            PAGE_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InternalNodeCodec, LeafNodeCodec};
    use crate::buffer::PAGE_SIZE;
    use crate::storage::page::{InternalNode, LeafNode, RecordId};

    #[test]
    fn leaf_codec_round_trip() {
        let mut leaf = LeafNode::new();
        leaf.insert(1, RecordId::new(1, 1));
        leaf.insert(-2, RecordId::new(2, 2));
        leaf.insert(1, RecordId::new(3, 3));
        leaf.right_sibling = 17;

        let bytes = LeafNodeCodec::encode(&leaf);
        assert_eq!(bytes.len(), PAGE_SIZE);
        let (decoded, _) = LeafNodeCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn zeroed_page_is_an_empty_leaf() {
        let (decoded, _) = LeafNodeCodec::decode(&[0u8; PAGE_SIZE]).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.right_sibling, 0);
    }

    #[test]
    fn leaf_occupancy_stops_at_zero_page_number() {
        let mut leaf = LeafNode::new();
        for i in 1..=5 {
            leaf.insert(i, RecordId::new(i as u32, 0));
        }
        let (left_after_split, _) = {
            // simulate a rewrite that shrinks the prefix
            let mut shrunk = leaf.clone();
            shrunk.keys.truncate(3);
            shrunk.rids.truncate(3);
            let bytes = LeafNodeCodec::encode(&shrunk);
            LeafNodeCodec::decode(&bytes).unwrap()
        };
        assert_eq!(left_after_split.len(), 3);
    }

    #[test]
    fn internal_codec_round_trip() {
        let node = InternalNode {
            level: 2,
            keys: vec![-10, 0, 10],
            children: vec![4, 8, 15, 16],
        };
        let bytes = InternalNodeCodec::encode(&node);
        assert_eq!(bytes.len(), PAGE_SIZE);
        let (decoded, _) = InternalNodeCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn internal_decode_rejects_bad_level() {
        let node = InternalNode {
            level: 1,
            keys: vec![5],
            children: vec![2, 3],
        };
        let mut bytes = InternalNodeCodec::encode(&node);
        bytes[0..4].copy_from_slice(&0i32.to_be_bytes());
        assert!(InternalNodeCodec::decode(&bytes).is_err());
    }
}
