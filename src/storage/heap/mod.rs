pub mod relation_heap;

pub use relation_heap::{RelationHeap, RelationScanner};
