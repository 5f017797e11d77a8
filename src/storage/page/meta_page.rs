use crate::buffer::PageId;
use crate::error::{PlumeError, PlumeResult};

pub const RELATION_NAME_MAX: usize = 32;

/// Attribute type of the indexed column. Only fixed-width integers are
/// supported; the discriminant is what lands on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Integer = 1,
}

impl AttributeType {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn try_from_i32(value: i32) -> PlumeResult<Self> {
        match value {
            1 => Ok(AttributeType::Integer),
            other => Err(PlumeError::Storage(format!(
                "unknown attribute type {}",
                other
            ))),
        }
    }
}

/// Contents of the index header page (page 0). Created once when the
/// index is built; only `root_page_id` changes afterwards, and only when
/// the root splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub relation_name: String,
    pub attribute_byte_offset: i32,
    pub attribute_type: AttributeType,
    pub root_page_id: PageId,
}

impl IndexMeta {
    pub fn try_new(
        relation_name: &str,
        attribute_byte_offset: i32,
        attribute_type: AttributeType,
        root_page_id: PageId,
    ) -> PlumeResult<Self> {
        if relation_name.len() > RELATION_NAME_MAX {
            return Err(PlumeError::Storage(format!(
                "relation name {:?} exceeds {} bytes",
                relation_name, RELATION_NAME_MAX
            )));
        }
        if attribute_byte_offset < 0 {
            return Err(PlumeError::Storage(format!(
                "attribute byte offset {} is negative",
                attribute_byte_offset
            )));
        }
        Ok(Self {
            relation_name: relation_name.to_string(),
            attribute_byte_offset,
            attribute_type,
            root_page_id,
        })
    }
}
