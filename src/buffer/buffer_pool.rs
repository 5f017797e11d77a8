use crate::buffer::page::{FrameId, Page, PageId, PageRef, INVALID_PAGE_ID};
use crate::config::BufferPoolConfig;
use crate::error::{PlumeError, PlumeResult};
use crate::storage::disk_manager::DiskManager;
use crate::utils::cache::lru_k::LruKReplacer;
use crate::utils::cache::Replacer;
use dashmap::DashMap;
use log::debug;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type FileId = u32;

/// Buffer pool shared by every paged file this component touches.
/// Pages are pinned via `PageRef` handles; a frame is only reclaimable
/// once every handle to it has been dropped.
#[derive(Debug)]
pub struct BufferPoolManager {
    pool: Vec<Arc<RwLock<Page>>>,
    replacer: Arc<RwLock<LruKReplacer>>,
    page_table: Arc<DashMap<(FileId, PageId), FrameId>>,
    free_list: RwLock<VecDeque<FrameId>>,
    files: DashMap<FileId, Arc<RwLock<DiskManager>>>,
    next_file_id: AtomicU32,
}

impl BufferPoolManager {
    pub fn new(config: BufferPoolConfig) -> Self {
        let mut pool = Vec::with_capacity(config.buffer_pool_size);
        let mut free_list = VecDeque::with_capacity(config.buffer_pool_size);
        for frame_id in 0..config.buffer_pool_size {
            pool.push(Arc::new(RwLock::new(Page::empty())));
            free_list.push_back(frame_id);
        }
        Self {
            pool,
            replacer: Arc::new(RwLock::new(LruKReplacer::with_k(
                config.buffer_pool_size,
                config.lru_k_k,
            ))),
            page_table: Arc::new(DashMap::new()),
            free_list: RwLock::new(free_list),
            files: DashMap::new(),
            next_file_id: AtomicU32::new(1),
        }
    }

    /// Registers a newly created paged file and returns its handle.
    pub fn create_file(&self, path: impl AsRef<Path>) -> PlumeResult<FileId> {
        self.register_file(DiskManager::create(path)?)
    }

    /// Registers an existing paged file. A missing file propagates the
    /// `io::ErrorKind::NotFound` condition from the disk manager.
    pub fn open_file(&self, path: impl AsRef<Path>) -> PlumeResult<FileId> {
        self.register_file(DiskManager::open(path)?)
    }

    fn register_file(&self, disk: DiskManager) -> PlumeResult<FileId> {
        let file_id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        debug!("registered file {} as {}", disk.path().display(), file_id);
        self.files.insert(file_id, Arc::new(RwLock::new(disk)));
        Ok(file_id)
    }

    fn disk(&self, file_id: FileId) -> PlumeResult<Arc<RwLock<DiskManager>>> {
        self.files
            .get(&file_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlumeError::Internal(format!("file {} is not registered", file_id)))
    }

    pub fn file_num_pages(&self, file_id: FileId) -> PlumeResult<u32> {
        Ok(self.disk(file_id)?.read().num_pages())
    }

    /// Allocates a fresh zeroed page of `file_id` and pins it.
    pub fn new_page(&self, file_id: FileId) -> PlumeResult<(PageId, PageRef)> {
        let disk = self.disk(file_id)?;
        let frame_id = self.allocate_frame()?;
        let page_id = disk.write().allocate_page();

        let page_arc = self.pool[frame_id].clone();
        {
            let mut page = page_arc.write();
            page.reset(file_id, page_id);
            page.pin_count.store(1, Ordering::SeqCst);
            page.is_dirty = true;
        }
        self.page_table.insert((file_id, page_id), frame_id);
        {
            let mut replacer = self.replacer.write();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
        }
        debug!("allocated page {}:{} in frame {}", file_id, page_id, frame_id);
        Ok((page_id, self.page_ref(page_arc)))
    }

    /// Pins an existing page, reading it from disk on a pool miss.
    pub fn fetch_page(&self, file_id: FileId, page_id: PageId) -> PlumeResult<PageRef> {
        if let Some(frame_id_entry) = self.page_table.get(&(file_id, page_id)) {
            let frame_id = *frame_id_entry;
            drop(frame_id_entry);

            let page_arc = self.pool[frame_id].clone();
            page_arc.read().pin_count.fetch_add(1, Ordering::SeqCst);
            {
                let mut replacer = self.replacer.write();
                replacer.record_access(frame_id)?;
                replacer.set_evictable(frame_id, false)?;
            }
            return Ok(self.page_ref(page_arc));
        }

        let disk = self.disk(file_id)?;
        let frame_id = self.allocate_frame()?;
        let data = match disk.write().read_page(page_id) {
            Ok(data) => data,
            Err(e) => {
                self.free_list.write().push_back(frame_id);
                return Err(e);
            }
        };

        let page_arc = self.pool[frame_id].clone();
        {
            let mut page = page_arc.write();
            page.reset(file_id, page_id);
            page.set_data(&data);
            page.is_dirty = false;
            page.pin_count.store(1, Ordering::SeqCst);
        }
        self.page_table.insert((file_id, page_id), frame_id);
        {
            let mut replacer = self.replacer.write();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false)?;
        }
        debug!("fetched page {}:{} into frame {}", file_id, page_id, frame_id);
        Ok(self.page_ref(page_arc))
    }

    /// Writes every dirty resident page of `file_id` back to disk.
    pub fn flush_file(&self, file_id: FileId) -> PlumeResult<()> {
        let disk = self.disk(file_id)?;
        let frames: Vec<FrameId> = self
            .page_table
            .iter()
            .filter(|entry| entry.key().0 == file_id)
            .map(|entry| *entry.value())
            .collect();
        for frame_id in frames {
            let page_arc = self.pool[frame_id].clone();
            let mut page = page_arc.write();
            if page.file_id == file_id && page.is_dirty {
                disk.write().write_page(page.page_id, page.data())?;
                page.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Flushes `file_id`, drops its resident pages from the pool and
    /// deregisters it. Fails while any of its pages is still pinned.
    pub fn close_file(&self, file_id: FileId) -> PlumeResult<()> {
        self.flush_file(file_id)?;
        let entries: Vec<((FileId, PageId), FrameId)> = self
            .page_table
            .iter()
            .filter(|entry| entry.key().0 == file_id)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        for (key, frame_id) in &entries {
            let pinned = self.pool[*frame_id].read().pin_count.load(Ordering::SeqCst);
            if pinned > 0 {
                return Err(PlumeError::Internal(format!(
                    "cannot close file {}: page {} still pinned",
                    file_id, key.1
                )));
            }
        }
        for (key, frame_id) in entries {
            self.page_table.remove(&key);
            self.replacer.write().remove(frame_id);
            self.pool[frame_id].write().reset(0, INVALID_PAGE_ID);
            self.free_list.write().push_back(frame_id);
        }
        self.files.remove(&file_id);
        debug!("closed file {}", file_id);
        Ok(())
    }

    /// Number of resident pages of `file_id` with a nonzero pin count.
    /// The pin-balance invariant expects zero between public calls.
    pub fn pinned_page_count(&self, file_id: FileId) -> usize {
        self.page_table
            .iter()
            .filter(|entry| entry.key().0 == file_id)
            .filter(|entry| {
                self.pool[*entry.value()]
                    .read()
                    .pin_count
                    .load(Ordering::SeqCst)
                    > 0
            })
            .count()
    }

    fn page_ref(&self, page: Arc<RwLock<Page>>) -> PageRef {
        PageRef {
            page,
            page_table: self.page_table.clone(),
            replacer: self.replacer.clone(),
        }
    }

    /// Takes a frame from the free list, or evicts the replacer's victim,
    /// flushing it first when dirty.
    fn allocate_frame(&self) -> PlumeResult<FrameId> {
        if let Some(frame_id) = self.free_list.write().pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.write().evict() else {
            return Err(PlumeError::Storage(
                "buffer pool exhausted: every frame is pinned".to_string(),
            ));
        };

        let page_arc = self.pool[frame_id].clone();
        let (victim_file, victim_page, is_dirty) = {
            let page = page_arc.read();
            (page.file_id, page.page_id, page.is_dirty)
        };
        self.page_table.remove(&(victim_file, victim_page));
        if is_dirty {
            debug!(
                "evicting dirty page {}:{} from frame {}",
                victim_file, victim_page, frame_id
            );
            let disk = self.disk(victim_file)?;
            let mut page = page_arc.write();
            disk.write().write_page(page.page_id, page.data())?;
            page.is_dirty = false;
        }
        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::BufferPoolManager;
    use crate::buffer::PAGE_SIZE;
    use crate::config::BufferPoolConfig;
    use tempfile::TempDir;

    fn small_pool() -> BufferPoolManager {
        BufferPoolManager::new(BufferPoolConfig {
            buffer_pool_size: 3,
            lru_k_k: 2,
        })
    }

    #[test]
    fn new_page_exhausts_and_recovers() {
        let dir = TempDir::new().unwrap();
        let pool = small_pool();
        let file = pool.create_file(dir.path().join("test.db")).unwrap();

        let (id1, page1) = pool.new_page(file).unwrap();
        let (_id2, _page2) = pool.new_page(file).unwrap();
        let (_id3, _page3) = pool.new_page(file).unwrap();
        assert!(pool.new_page(file).is_err());

        drop(page1);
        let (id4, _page4) = pool.new_page(file).unwrap();
        assert_ne!(id1, id4);
    }

    #[test]
    fn fetch_round_trips_through_eviction() {
        let dir = TempDir::new().unwrap();
        let pool = small_pool();
        let file = pool.create_file(dir.path().join("test.db")).unwrap();

        let (id1, page1) = pool.new_page(file).unwrap();
        {
            let mut image = [0u8; PAGE_SIZE];
            image[10] = 42;
            page1.write().set_data(&image);
        }
        drop(page1);

        // force id1 out of the pool
        for _ in 0..4 {
            let (_, page) = pool.new_page(file).unwrap();
            drop(page);
        }

        let page = pool.fetch_page(file, id1).unwrap();
        assert_eq!(page.read().data()[10], 42);
    }

    #[test]
    fn pinned_count_returns_to_zero() {
        let dir = TempDir::new().unwrap();
        let pool = small_pool();
        let file = pool.create_file(dir.path().join("test.db")).unwrap();

        let (id1, page1) = pool.new_page(file).unwrap();
        assert_eq!(pool.pinned_page_count(file), 1);
        drop(page1);
        assert_eq!(pool.pinned_page_count(file), 0);

        let page = pool.fetch_page(file, id1).unwrap();
        assert_eq!(pool.pinned_page_count(file), 1);
        drop(page);
        assert_eq!(pool.pinned_page_count(file), 0);
    }

    #[test]
    fn close_file_rejects_pinned_pages() {
        let dir = TempDir::new().unwrap();
        let pool = small_pool();
        let file = pool.create_file(dir.path().join("test.db")).unwrap();

        let (_, page) = pool.new_page(file).unwrap();
        assert!(pool.close_file(file).is_err());
        drop(page);
        pool.close_file(file).unwrap();
    }
}
