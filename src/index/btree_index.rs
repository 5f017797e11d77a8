use crate::buffer::{BufferPoolManager, FileId, PageId, PageRef};
use crate::error::{PlumeError, PlumeResult};
use crate::index::scan::ScanCursor;
use crate::storage::codec::{CommonCodec, IndexMetaCodec, InternalNodeCodec, LeafNodeCodec};
use crate::storage::heap::RelationHeap;
use crate::storage::page::{AttributeType, IndexMeta, InternalNode, LeafNode, RecordId};
use crate::utils::util::page_bytes_to_array;
use log::{debug, error};
use std::path::Path;
use std::sync::Arc;

/// The header page of an index file.
pub const INDEX_META_PAGE_ID: PageId = 0;
/// The leaf the index is born with. A root created by growth is always a
/// freshly allocated internal page, so the root is a leaf exactly while
/// `root_page_id` still equals this id.
pub const INDEX_INIT_ROOT_PAGE_ID: PageId = 1;

/// Separator and right half produced by a node split, handed back up the
/// recursion for the parent to absorb.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitEntry {
    pub separator: i32,
    pub right_page_id: PageId,
}

/// Disk-resident B+-tree index over one integer attribute of a relation.
///
/// The index file is `"<relation_name>.<attribute_byte_offset>"` inside
/// `dir`. Page 0 holds the metadata, page 1 the initial leaf root; leaves
/// are chained left to right through their right-sibling links.
#[derive(Debug)]
pub struct BTreeIndex {
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) file_id: FileId,
    pub(crate) meta: IndexMeta,
    file_name: String,
    pub(crate) cursor: ScanCursor,
}

impl BTreeIndex {
    /// Opens the index for `(relation_name, attribute_byte_offset)`,
    /// creating and bulk-building it from the relation file when it does
    /// not exist yet. Returns the index and its file name.
    pub fn open_or_create(
        buffer_pool: Arc<BufferPoolManager>,
        dir: impl AsRef<Path>,
        relation_name: &str,
        attribute_byte_offset: i32,
        attribute_type: AttributeType,
    ) -> PlumeResult<(Self, String)> {
        let file_name = format!("{}.{}", relation_name, attribute_byte_offset);
        let index_path = dir.as_ref().join(&file_name);

        match buffer_pool.open_file(&index_path) {
            Ok(file_id) => {
                let index = Self::open_existing(
                    buffer_pool,
                    file_id,
                    file_name.clone(),
                    relation_name,
                    attribute_byte_offset,
                    attribute_type,
                )?;
                Ok((index, file_name))
            }
            Err(PlumeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let index = Self::create(
                    buffer_pool,
                    dir.as_ref(),
                    &index_path,
                    file_name.clone(),
                    relation_name,
                    attribute_byte_offset,
                    attribute_type,
                )?;
                Ok((index, file_name))
            }
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        buffer_pool: Arc<BufferPoolManager>,
        file_id: FileId,
        file_name: String,
        relation_name: &str,
        attribute_byte_offset: i32,
        attribute_type: AttributeType,
    ) -> PlumeResult<Self> {
        let meta = {
            let meta_page = buffer_pool.fetch_page(file_id, INDEX_META_PAGE_ID)?;
            let guard = meta_page.read();
            IndexMetaCodec::decode(guard.data())?.0
        };

        if meta.relation_name != relation_name
            || meta.attribute_byte_offset != attribute_byte_offset
            || meta.attribute_type != attribute_type
        {
            let mismatch = format!(
                "index file {} was built for ({}, {}, {:?})",
                file_name, meta.relation_name, meta.attribute_byte_offset, meta.attribute_type
            );
            if let Err(e) = buffer_pool.close_file(file_id) {
                error!("failed to close mismatched index file {}: {}", file_name, e);
            }
            return Err(PlumeError::BadIndexInfo(mismatch));
        }

        debug!(
            "opened index {} with root page {}",
            file_name, meta.root_page_id
        );
        Ok(Self {
            buffer_pool,
            file_id,
            meta,
            file_name,
            cursor: ScanCursor::new(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        buffer_pool: Arc<BufferPoolManager>,
        dir: &Path,
        index_path: &Path,
        file_name: String,
        relation_name: &str,
        attribute_byte_offset: i32,
        attribute_type: AttributeType,
    ) -> PlumeResult<Self> {
        let meta = IndexMeta::try_new(
            relation_name,
            attribute_byte_offset,
            attribute_type,
            INDEX_INIT_ROOT_PAGE_ID,
        )?;

        let file_id = buffer_pool.create_file(index_path)?;
        {
            let (meta_page_id, meta_page) = buffer_pool.new_page(file_id)?;
            debug_assert_eq!(meta_page_id, INDEX_META_PAGE_ID);
            meta_page
                .write()
                .set_data(&page_bytes_to_array(&IndexMetaCodec::encode(&meta)));

            let (root_page_id, root_page) = buffer_pool.new_page(file_id)?;
            debug_assert_eq!(root_page_id, INDEX_INIT_ROOT_PAGE_ID);
            root_page
                .write()
                .set_data(&page_bytes_to_array(&LeafNodeCodec::encode(&LeafNode::new())));
        }

        let mut index = Self {
            buffer_pool,
            file_id,
            meta,
            file_name,
            cursor: ScanCursor::new(),
        };
        index.bulk_build(dir.join(relation_name))?;
        Ok(index)
    }

    /// Streams the relation through `insert`. A missing relation file
    /// leaves the index empty.
    fn bulk_build(&mut self, relation_path: impl AsRef<Path>) -> PlumeResult<()> {
        let heap = match RelationHeap::open(self.buffer_pool.clone(), relation_path) {
            Ok(heap) => heap,
            Err(PlumeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("index {} built over an absent relation", self.file_name);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let offset = self.meta.attribute_byte_offset as usize;
        let mut scanner = heap.scan()?;
        let mut built = 0u64;
        while let Some((record, rid)) = scanner.next()? {
            if record.len() < offset + 4 {
                return Err(PlumeError::Storage(format!(
                    "record {:?} is too short for attribute offset {}",
                    rid, offset
                )));
            }
            let (key, _) = CommonCodec::decode_i32(&record[offset..])?;
            self.insert(key, rid)?;
            built += 1;
        }
        heap.close()?;
        debug!("bulk-built index {} from {} records", self.file_name, built);
        Ok(())
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Number of this index's pages currently pinned in the buffer pool.
    /// Zero between public calls unless a scan is positioned on a leaf.
    pub fn pinned_page_count(&self) -> usize {
        self.buffer_pool.pinned_page_count(self.file_id)
    }

    /// Root-to-leaf path length. The root leaf alone counts as 1.
    pub fn height(&self) -> PlumeResult<u32> {
        if self.root_is_leaf() {
            return Ok(1);
        }
        let page = self.fetch(self.meta.root_page_id)?;
        let guard = page.read();
        let (root, _) = InternalNodeCodec::decode(guard.data())?;
        Ok(root.level as u32 + 1)
    }

    pub(crate) fn root_is_leaf(&self) -> bool {
        self.meta.root_page_id == INDEX_INIT_ROOT_PAGE_ID
    }

    pub(crate) fn root_page_id(&self) -> PageId {
        self.meta.root_page_id
    }

    pub(crate) fn fetch(&self, page_id: PageId) -> PlumeResult<PageRef> {
        self.buffer_pool.fetch_page(self.file_id, page_id)
    }

    /// Inserts one `(key, rid)` pair, splitting nodes along the descent
    /// path as needed. Duplicate keys are preserved in insertion order.
    pub fn insert(&mut self, key: i32, rid: RecordId) -> PlumeResult<()> {
        let root_page_id = self.meta.root_page_id;
        let split = if self.root_is_leaf() {
            self.insert_into_leaf(root_page_id, key, rid)?
        } else {
            self.insert_into_internal(root_page_id, key, rid)?
        };
        if let Some(entry) = split {
            self.grow_root(entry)?;
        }
        Ok(())
    }

    /// Descends one internal level. The node stays pinned until the child
    /// call has returned and any split record has been absorbed.
    fn insert_into_internal(
        &self,
        page_id: PageId,
        key: i32,
        rid: RecordId,
    ) -> PlumeResult<Option<SplitEntry>> {
        let page = self.fetch(page_id)?;
        let mut node = {
            let guard = page.read();
            InternalNodeCodec::decode(guard.data())?.0
        };
        let child_index = node.child_index(key);
        let child_page_id = *node.children.get(child_index).ok_or_else(|| {
            PlumeError::Internal(format!(
                "internal page {} has no child at index {}",
                page_id, child_index
            ))
        })?;

        let child_split = if node.level == 1 {
            self.insert_into_leaf(child_page_id, key, rid)?
        } else {
            self.insert_into_internal(child_page_id, key, rid)?
        };
        let Some(entry) = child_split else {
            return Ok(None);
        };

        if !node.is_full() {
            node.insert(entry.separator, entry.right_page_id);
            page.write()
                .set_data(&page_bytes_to_array(&InternalNodeCodec::encode(&node)));
            return Ok(None);
        }

        let (new_page_id, new_page) = self.buffer_pool.new_page(self.file_id)?;
        let (push_up, right) = node.split(entry.separator, entry.right_page_id);
        page.write()
            .set_data(&page_bytes_to_array(&InternalNodeCodec::encode(&node)));
        new_page
            .write()
            .set_data(&page_bytes_to_array(&InternalNodeCodec::encode(&right)));
        debug!(
            "split internal page {} into {} pushing key {}",
            page_id, new_page_id, push_up
        );
        Ok(Some(SplitEntry {
            separator: push_up,
            right_page_id: new_page_id,
        }))
    }

    fn insert_into_leaf(
        &self,
        page_id: PageId,
        key: i32,
        rid: RecordId,
    ) -> PlumeResult<Option<SplitEntry>> {
        let page = self.fetch(page_id)?;
        let mut leaf = {
            let guard = page.read();
            LeafNodeCodec::decode(guard.data())?.0
        };

        if !leaf.is_full() {
            leaf.insert(key, rid);
            page.write()
                .set_data(&page_bytes_to_array(&LeafNodeCodec::encode(&leaf)));
            return Ok(None);
        }

        let (new_page_id, new_page) = self.buffer_pool.new_page(self.file_id)?;
        let (separator, right) = leaf.split(key, rid);
        leaf.right_sibling = new_page_id;
        page.write()
            .set_data(&page_bytes_to_array(&LeafNodeCodec::encode(&leaf)));
        new_page
            .write()
            .set_data(&page_bytes_to_array(&LeafNodeCodec::encode(&right)));
        debug!(
            "split leaf page {} into {} with separator {}",
            page_id, new_page_id, separator
        );
        Ok(Some(SplitEntry {
            separator,
            right_page_id: new_page_id,
        }))
    }

    /// Installs a new internal root above the split halves. The meta page
    /// is rewritten last, so a failure before that point leaves the old
    /// root authoritative.
    fn grow_root(&mut self, entry: SplitEntry) -> PlumeResult<()> {
        let old_root_page_id = self.meta.root_page_id;
        let level = if self.root_is_leaf() {
            1
        } else {
            let page = self.fetch(old_root_page_id)?;
            let guard = page.read();
            InternalNodeCodec::decode(guard.data())?.0.level + 1
        };

        let (new_root_page_id, new_root_page) = self.buffer_pool.new_page(self.file_id)?;
        let root = InternalNode::new_root(
            level,
            entry.separator,
            old_root_page_id,
            entry.right_page_id,
        );
        new_root_page
            .write()
            .set_data(&page_bytes_to_array(&InternalNodeCodec::encode(&root)));
        drop(new_root_page);

        let meta_page = self.fetch(INDEX_META_PAGE_ID)?;
        self.meta.root_page_id = new_root_page_id;
        meta_page
            .write()
            .set_data(&page_bytes_to_array(&IndexMetaCodec::encode(&self.meta)));
        debug!(
            "grew root of {} to internal page {} at level {}",
            self.file_name, new_root_page_id, level
        );
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        // release any leaf the cursor still pins, then flush and close
        self.cursor.reset();
        if let Err(e) = self.buffer_pool.close_file(self.file_id) {
            error!("failed to close index file {}: {}", self.file_name, e);
        }
    }
}
