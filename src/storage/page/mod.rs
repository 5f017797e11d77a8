pub mod index_page;
pub mod meta_page;

pub use index_page::{InternalNode, LeafNode, INTERNAL_CAP, LEAF_CAP};
pub use meta_page::{AttributeType, IndexMeta, RELATION_NAME_MAX};

/// Position of a tuple in the base relation. A `page_number` of zero
/// never denotes a live record; leaf occupancy detection relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    pub page_number: u32,
    pub slot_number: u32,
}

impl RecordId {
    pub fn new(page_number: u32, slot_number: u32) -> Self {
        Self {
            page_number,
            slot_number,
        }
    }

    pub const INVALID: RecordId = RecordId {
        page_number: 0,
        slot_number: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.page_number != 0
    }
}
