pub mod common;
pub mod index_page;
pub mod meta_page;

pub use common::CommonCodec;
pub use index_page::{InternalNodeCodec, LeafNodeCodec, RidCodec};
pub use meta_page::IndexMetaCodec;

// data + consumed offset
pub type DecodedData<T> = (T, usize);
