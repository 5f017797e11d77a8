use crate::buffer::FrameId;
use crate::error::PlumeResult;

pub mod lru_k;

pub trait Replacer {
    fn record_access(&mut self, frame_id: FrameId) -> PlumeResult<()>;

    fn evict(&mut self) -> Option<FrameId>;

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> PlumeResult<()>;

    fn remove(&mut self, frame_id: FrameId);

    fn size(&self) -> usize;
}
