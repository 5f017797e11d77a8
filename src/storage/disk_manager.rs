use crate::buffer::{PageId, PAGE_SIZE};
use crate::error::{PlumeError, PlumeResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Page-granular store over a single file. Page ids are allocated from a
/// monotonic counter seeded by the on-disk length.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    path: PathBuf,
    num_pages: u32,
}

impl DiskManager {
    /// Opens an existing paged file. A missing file surfaces the standard
    /// `io::ErrorKind::NotFound` condition so callers can distinguish it.
    pub fn open(path: impl AsRef<Path>) -> PlumeResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(PlumeError::Storage(format!(
                "file {} size {} is not a multiple of the page size",
                path.display(),
                file_size
            )));
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: (file_size / PAGE_SIZE as u64) as u32,
        })
    }

    /// Creates a new paged file. Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>) -> PlumeResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_page(&mut self, page_id: PageId) -> PlumeResult<[u8; PAGE_SIZE]> {
        if page_id >= self.num_pages {
            return Err(PlumeError::Storage(format!(
                "page {} is beyond the end of {} ({} pages)",
                page_id,
                self.path.display(),
                self.num_pages
            )));
        }
        let mut data = [0u8; PAGE_SIZE];
        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> PlumeResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(PlumeError::Storage(format!(
                "page image is {} bytes instead of {}",
                data.len(),
                PAGE_SIZE
            )));
        }
        self.file
            .seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(data)?;
        self.num_pages = self.num_pages.max(page_id + 1);
        Ok(())
    }

    /// Hands out the next page id. No I/O happens until the page is
    /// written back.
    pub fn allocate_page(&mut self) -> PageId {
        let page_id = self.num_pages;
        self.num_pages += 1;
        page_id
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn first_page_id(&self) -> PageId {
        0
    }
}
