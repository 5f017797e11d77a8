use crate::buffer::buffer_pool::FileId;
use crate::utils::cache::lru_k::LruKReplacer;
use crate::utils::cache::Replacer;
use bytes::Bytes;
use dashmap::DashMap;
use log::error;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type PageId = u32;
pub type FrameId = usize;

pub const INVALID_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 4096;

/// One buffer frame. `is_dirty` is set whenever the page image is
/// overwritten and cleared when the frame is written back to disk.
#[derive(Debug)]
pub struct Page {
    pub file_id: FileId,
    pub page_id: PageId,
    data: [u8; PAGE_SIZE],
    pub pin_count: AtomicU32,
    pub is_dirty: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            file_id: 0,
            page_id: INVALID_PAGE_ID,
            data: [0; PAGE_SIZE],
            pin_count: AtomicU32::new(0),
            is_dirty: false,
        }
    }

    pub fn reset(&mut self, file_id: FileId, page_id: PageId) {
        self.file_id = file_id;
        self.page_id = page_id;
        self.data = [0; PAGE_SIZE];
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty = false;
    }

    pub fn set_data(&mut self, data: &[u8; PAGE_SIZE]) {
        self.data.copy_from_slice(data);
        self.is_dirty = true;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }
}

/// Pinned handle to a buffer frame. Dropping the handle decrements the
/// pin count; the frame becomes evictable once the count reaches zero.
#[derive(Debug)]
pub struct PageRef {
    pub page: Arc<RwLock<Page>>,
    pub(crate) page_table: Arc<DashMap<(FileId, PageId), FrameId>>,
    pub(crate) replacer: Arc<RwLock<LruKReplacer>>,
}

impl Deref for PageRef {
    type Target = Arc<RwLock<Page>>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        let guard = self.page.read();
        let key = (guard.file_id, guard.page_id);
        let old_pin_count = guard.pin_count.fetch_sub(1, Ordering::Release);
        if old_pin_count == 0 {
            guard.pin_count.store(0, Ordering::Release);
            error!("page {}:{} unpinned with pin count already 0", key.0, key.1);
            return;
        }
        drop(guard);

        if old_pin_count == 1 {
            if let Some(frame_id_entry) = self.page_table.get(&key) {
                let frame_id = *frame_id_entry;
                drop(frame_id_entry);
                if let Err(e) = self.replacer.write().set_evictable(frame_id, true) {
                    error!(
                        "failed to set frame {} (page {}:{}) evictable: {:?}",
                        frame_id, key.0, key.1, e
                    );
                }
            } else {
                error!(
                    "page {}:{} missing from page table during unpin",
                    key.0, key.1
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRef};
    use crate::utils::cache::lru_k::LruKReplacer;
    use crate::utils::cache::Replacer;
    use dashmap::DashMap;
    use parking_lot::RwLock;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[test]
    fn page_ref_unpins_on_drop() {
        let mut page = Page::empty();
        page.reset(1, 7);
        page.pin_count.store(1, Ordering::SeqCst);
        let page = Arc::new(RwLock::new(page));

        let page_table = Arc::new(DashMap::new());
        page_table.insert((1u32, 7u32), 0usize);
        let replacer = Arc::new(RwLock::new(LruKReplacer::with_k(4, 2)));
        replacer.write().record_access(0).unwrap();
        replacer.write().set_evictable(0, false).unwrap();

        let page_ref = PageRef {
            page: page.clone(),
            page_table,
            replacer: replacer.clone(),
        };
        assert_eq!(Arc::strong_count(&page), 2);
        assert_eq!(replacer.read().size(), 0);

        drop(page_ref);
        assert_eq!(page.read().pin_count.load(Ordering::SeqCst), 0);
        assert_eq!(replacer.read().size(), 1);
    }
}
