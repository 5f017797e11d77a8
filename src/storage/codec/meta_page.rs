use crate::buffer::PAGE_SIZE;
use crate::error::{PlumeError, PlumeResult};
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::{AttributeType, IndexMeta, RELATION_NAME_MAX};

/// Header page (page 0) image: zero-padded relation name, attribute
/// byte offset, attribute type discriminant, root page id.
pub struct IndexMetaCodec;

impl IndexMetaCodec {
    pub fn encode(meta: &IndexMeta) -> Vec<u8> {
        debug_assert!(meta.relation_name.len() <= RELATION_NAME_MAX);
        let mut bytes = Vec::with_capacity(PAGE_SIZE);
        let mut name = [0u8; RELATION_NAME_MAX];
        name[..meta.relation_name.len()].copy_from_slice(meta.relation_name.as_bytes());
        bytes.extend_from_slice(&name);
        bytes.extend(CommonCodec::encode_i32(meta.attribute_byte_offset));
        bytes.extend(CommonCodec::encode_i32(meta.attribute_type.as_i32()));
        bytes.extend(CommonCodec::encode_u32(meta.root_page_id));
        bytes.resize(PAGE_SIZE, 0);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> PlumeResult<DecodedData<IndexMeta>> {
        if bytes.len() != PAGE_SIZE {
            return Err(PlumeError::Storage(format!(
                "meta page size is {} instead of {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let name_end = bytes[..RELATION_NAME_MAX]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_MAX);
        let relation_name = std::str::from_utf8(&bytes[..name_end])
            .map_err(|e| PlumeError::Storage(format!("relation name is not utf-8: {}", e)))?
            .to_string();

        let mut left_bytes = &bytes[RELATION_NAME_MAX..];
        let (attribute_byte_offset, offset) = CommonCodec::decode_i32(left_bytes)?;
        left_bytes = &left_bytes[offset..];
        let (attribute_type, offset) = CommonCodec::decode_i32(left_bytes)?;
        left_bytes = &left_bytes[offset..];
        let (root_page_id, _) = CommonCodec::decode_u32(left_bytes)?;

        Ok((
            IndexMeta {
                relation_name,
                attribute_byte_offset,
                attribute_type: AttributeType::try_from_i32(attribute_type)?,
                root_page_id,
            },
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::IndexMetaCodec;
    use crate::storage::page::{AttributeType, IndexMeta};

    #[test]
    fn meta_page_codec_round_trip() {
        let meta = IndexMeta::try_new("orders", 16, AttributeType::Integer, 1).unwrap();
        let (decoded, _) = IndexMetaCodec::decode(&IndexMetaCodec::encode(&meta)).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn meta_rejects_long_relation_name() {
        let name = "x".repeat(64);
        assert!(IndexMeta::try_new(&name, 0, AttributeType::Integer, 1).is_err());
    }
}
