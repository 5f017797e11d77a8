use crate::buffer::{BufferPoolManager, FileId, PageId, PAGE_SIZE};
use crate::error::{PlumeError, PlumeResult};
use crate::storage::codec::CommonCodec;
use crate::storage::page::RecordId;
use crate::utils::util::page_bytes_to_array;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

const HEAP_HEADER_PAGE_ID: PageId = 0;
// data pages carry a slot count word before the records
const DATA_PAGE_HEADER: usize = 4;

/// Heap file of fixed-width records, scanned in file order during the
/// initial index build. Data pages start at page 1, so a live record id
/// never carries `page_number == 0`.
#[derive(Debug)]
pub struct RelationHeap {
    buffer_pool: Arc<BufferPoolManager>,
    file_id: FileId,
    record_size: usize,
    record_count: u32,
}

impl RelationHeap {
    pub fn create(
        buffer_pool: Arc<BufferPoolManager>,
        path: impl AsRef<Path>,
        record_size: usize,
    ) -> PlumeResult<Self> {
        if record_size == 0 || record_size > PAGE_SIZE - DATA_PAGE_HEADER {
            return Err(PlumeError::Storage(format!(
                "record size {} does not fit a data page",
                record_size
            )));
        }
        let file_id = buffer_pool.create_file(path)?;
        let (header_page_id, header_page) = buffer_pool.new_page(file_id)?;
        debug_assert_eq!(header_page_id, HEAP_HEADER_PAGE_ID);
        let heap = Self {
            buffer_pool: buffer_pool.clone(),
            file_id,
            record_size,
            record_count: 0,
        };
        header_page.write().set_data(&heap.encode_header());
        Ok(heap)
    }

    pub fn open(buffer_pool: Arc<BufferPoolManager>, path: impl AsRef<Path>) -> PlumeResult<Self> {
        let file_id = buffer_pool.open_file(path)?;
        let header_page = buffer_pool.fetch_page(file_id, HEAP_HEADER_PAGE_ID)?;
        let (record_size, record_count) = {
            let page = header_page.read();
            let (record_size, offset) = CommonCodec::decode_u32(page.data())?;
            let (record_count, _) = CommonCodec::decode_u32(&page.data()[offset..])?;
            (record_size as usize, record_count)
        };
        if record_size == 0 || record_size > PAGE_SIZE - DATA_PAGE_HEADER {
            return Err(PlumeError::Storage(format!(
                "heap header carries unusable record size {}",
                record_size
            )));
        }
        Ok(Self {
            buffer_pool,
            file_id,
            record_size,
            record_count,
        })
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    fn records_per_page(&self) -> usize {
        (PAGE_SIZE - DATA_PAGE_HEADER) / self.record_size
    }

    fn encode_header(&self) -> [u8; PAGE_SIZE] {
        let mut bytes = Vec::with_capacity(PAGE_SIZE);
        bytes.extend(CommonCodec::encode_u32(self.record_size as u32));
        bytes.extend(CommonCodec::encode_u32(self.record_count));
        bytes.resize(PAGE_SIZE, 0);
        page_bytes_to_array(&bytes)
    }

    /// Appends one record and returns its id.
    pub fn append(&mut self, record: &[u8]) -> PlumeResult<RecordId> {
        if record.len() != self.record_size {
            return Err(PlumeError::Storage(format!(
                "record is {} bytes, heap stores {}-byte records",
                record.len(),
                self.record_size
            )));
        }

        let num_pages = self.buffer_pool.file_num_pages(self.file_id)?;
        let last_data_page = if num_pages > 1 { num_pages - 1 } else { 0 };

        let (page_id, page, slot) = if last_data_page == 0 {
            let (page_id, page) = self.buffer_pool.new_page(self.file_id)?;
            (page_id, page, 0u32)
        } else {
            let page = self.buffer_pool.fetch_page(self.file_id, last_data_page)?;
            let (slot_count, _) = CommonCodec::decode_u32(page.read().data())?;
            if (slot_count as usize) < self.records_per_page() {
                (last_data_page, page, slot_count)
            } else {
                drop(page);
                let (page_id, page) = self.buffer_pool.new_page(self.file_id)?;
                (page_id, page, 0u32)
            }
        };

        {
            let mut guard = page.write();
            let mut image = page_bytes_to_array(guard.data());
            image[0..4].copy_from_slice(&CommonCodec::encode_u32(slot + 1));
            let at = DATA_PAGE_HEADER + slot as usize * self.record_size;
            image[at..at + self.record_size].copy_from_slice(record);
            guard.set_data(&image);
        }
        drop(page);

        self.record_count += 1;
        let header_page = self
            .buffer_pool
            .fetch_page(self.file_id, HEAP_HEADER_PAGE_ID)?;
        header_page.write().set_data(&self.encode_header());

        Ok(RecordId::new(page_id, slot))
    }

    /// Streams every record in file order.
    pub fn scan(&self) -> PlumeResult<RelationScanner> {
        Ok(RelationScanner {
            buffer_pool: self.buffer_pool.clone(),
            file_id: self.file_id,
            record_size: self.record_size,
            num_pages: self.buffer_pool.file_num_pages(self.file_id)?,
            current_page: HEAP_HEADER_PAGE_ID,
            buffered: VecDeque::new(),
        })
    }

    pub fn flush(&self) -> PlumeResult<()> {
        self.buffer_pool.flush_file(self.file_id)
    }

    pub fn close(self) -> PlumeResult<()> {
        self.buffer_pool.close_file(self.file_id)
    }
}

/// Cursor over a relation heap. Holds a pin only while it buffers one
/// data page's records.
#[derive(Debug)]
pub struct RelationScanner {
    buffer_pool: Arc<BufferPoolManager>,
    file_id: FileId,
    record_size: usize,
    num_pages: u32,
    current_page: PageId,
    buffered: VecDeque<(Bytes, RecordId)>,
}

impl RelationScanner {
    pub fn next(&mut self) -> PlumeResult<Option<(Bytes, RecordId)>> {
        loop {
            if let Some(entry) = self.buffered.pop_front() {
                return Ok(Some(entry));
            }
            if self.current_page + 1 >= self.num_pages {
                return Ok(None);
            }
            self.current_page += 1;

            let page = self
                .buffer_pool
                .fetch_page(self.file_id, self.current_page)?;
            let guard = page.read();
            let (slot_count, _) = CommonCodec::decode_u32(guard.data())?;
            for slot in 0..slot_count {
                let at = DATA_PAGE_HEADER + slot as usize * self.record_size;
                let record = Bytes::copy_from_slice(&guard.data()[at..at + self.record_size]);
                self.buffered
                    .push_back((record, RecordId::new(self.current_page, slot)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RelationHeap;
    use crate::buffer::BufferPoolManager;
    use crate::config::BufferPoolConfig;
    use crate::storage::page::RecordId;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn append_then_scan_in_order() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::default()));
        let mut heap = RelationHeap::create(pool.clone(), dir.path().join("rel"), 8).unwrap();

        let mut rids = Vec::new();
        for i in 0u32..1000 {
            let mut record = [0u8; 8];
            record[..4].copy_from_slice(&i.to_be_bytes());
            rids.push(heap.append(&record).unwrap());
        }
        assert_eq!(heap.record_count(), 1000);
        assert!(rids.iter().all(|rid| rid.page_number >= 1));

        let mut scanner = heap.scan().unwrap();
        let mut seen = 0u32;
        while let Some((record, rid)) = scanner.next().unwrap() {
            assert_eq!(&record[..4], &seen.to_be_bytes());
            assert_eq!(rid, rids[seen as usize]);
            seen += 1;
        }
        assert_eq!(seen, 1000);
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rel");
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::default()));
        {
            let mut heap = RelationHeap::create(pool.clone(), &path, 4).unwrap();
            heap.append(&7i32.to_be_bytes()).unwrap();
            heap.append(&9i32.to_be_bytes()).unwrap();
            heap.close().unwrap();
        }
        let heap = RelationHeap::open(pool, &path).unwrap();
        assert_eq!(heap.record_count(), 2);
        let mut scanner = heap.scan().unwrap();
        let (first, rid) = scanner.next().unwrap().unwrap();
        assert_eq!(&first[..], &7i32.to_be_bytes());
        assert_eq!(rid, RecordId::new(1, 0));
    }
}
