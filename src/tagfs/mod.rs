//! TagFS: an in-memory filesystem indexed by `(key, value)` tags
//! instead of path components.
//!
//! Superblock + fixed inode table + data-block bitmap + inverted tag
//! index. Files are backed by contiguous block extents; the "filename"
//! is, by convention, the value of the `name` tag. All state is owned by
//! the storage deck and touched only from its handlers.

pub mod index;

use std::collections::BTreeSet;

use log::warn;

use crate::bitmap::Bitmap;
use crate::config::{TAGFS_BLOCK_COUNT, TAGFS_BLOCK_SIZE, TAGFS_INODE_COUNT};
use crate::constants::{MAX_TAGS_PER_FILE, TAG_KEY_LEN};
use crate::payload::{QueryOp, Tag};
use index::TagIndex;

pub const TAGFS_MAGIC: u32 = 0x5447_4653; // "TGFS"
pub const TAGFS_VERSION: u32 = 1;

/// A `size` of all-ones marks a free inode slot.
pub const FREE_SLOT: u64 = u64::MAX;

/// Conventional tag key carrying a file's name.
pub const NAME_TAG_KEY: &[u8] = b"name";

/// Inode flag: tag-index desync detected; file is read-only.
pub const INODE_FLAG_QUARANTINED: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFsError {
    /// Inode table exhausted.
    NoFreeInode,
    /// No contiguous block extent large enough.
    NoSpace,
    /// No live inode with that id (or no file with that name).
    NotFound,
    /// Inode already carries the maximum number of tags.
    TagCapacity,
    /// File is quarantined (index desync); mutation refused.
    Quarantined,
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub inode_count: u32,
    pub block_count: u32,
    pub free_inodes: u32,
    pub free_blocks: u32,
}

/// One slot of the fixed inode table.
#[derive(Clone, Copy)]
pub struct FileInode {
    pub inode_id: u32,
    pub size: u64,
    pub first_block: u32,
    pub block_count: u32,
    pub tag_count: u32,
    pub flags: u32,
    tags: [Tag; MAX_TAGS_PER_FILE],
}

impl FileInode {
    fn free_slot() -> Self {
        Self {
            inode_id: 0,
            size: FREE_SLOT,
            first_block: 0,
            block_count: 0,
            tag_count: 0,
            flags: 0,
            tags: [bytemuck::Zeroable::zeroed(); MAX_TAGS_PER_FILE],
        }
    }

    /// A file exists iff the slot is in use and the id is assigned.
    pub fn is_live(&self) -> bool {
        self.size != FREE_SLOT && self.inode_id != 0
    }

    pub fn is_quarantined(&self) -> bool {
        self.flags & INODE_FLAG_QUARANTINED != 0
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags[..self.tag_count as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub inode_id: u32,
    pub size: u64,
    pub block_count: u32,
    pub tag_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    pub count: usize,
    pub truncated: bool,
}

pub struct TagFs {
    sb: Superblock,
    inodes: Vec<FileInode>,
    /// Free-id stack: create is O(1) instead of an O(N) slot scan.
    free_ids: Vec<u32>,
    blocks: Bitmap,
    data: Vec<u8>,
    index: TagIndex,
    block_size: usize,
}

impl TagFs {
    pub fn new(inode_count: usize, block_count: usize, block_size: usize) -> Self {
        // Pop order gives out ascending ids starting at 1.
        let free_ids: Vec<u32> = (1..=inode_count as u32).rev().collect();
        Self {
            sb: Superblock {
                magic: TAGFS_MAGIC,
                version: TAGFS_VERSION,
                inode_count: inode_count as u32,
                block_count: block_count as u32,
                free_inodes: inode_count as u32,
                free_blocks: block_count as u32,
            },
            inodes: vec![FileInode::free_slot(); inode_count],
            free_ids,
            blocks: Bitmap::new(block_count),
            data: vec![0u8; block_count * block_size],
            index: TagIndex::new(),
            block_size,
        }
    }

    pub fn with_default_geometry() -> Self {
        Self::new(TAGFS_INODE_COUNT, TAGFS_BLOCK_COUNT, TAGFS_BLOCK_SIZE)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    fn slot(&self, inode_id: u64) -> Result<&FileInode, TagFsError> {
        let idx = inode_id
            .checked_sub(1)
            .filter(|&i| i < self.inodes.len() as u64)
            .ok_or(TagFsError::NotFound)? as usize;
        let inode = &self.inodes[idx];
        if !inode.is_live() {
            return Err(TagFsError::NotFound);
        }
        Ok(inode)
    }

    fn slot_mut(&mut self, inode_id: u64) -> Result<&mut FileInode, TagFsError> {
        let idx = inode_id
            .checked_sub(1)
            .filter(|&i| i < self.inodes.len() as u64)
            .ok_or(TagFsError::NotFound)? as usize;
        let inode = &mut self.inodes[idx];
        if !inode.is_live() {
            return Err(TagFsError::NotFound);
        }
        Ok(inode)
    }

    /// Defence against an index that has drifted from the inode table:
    /// every tag on the inode must be indexed under its id. Run before
    /// each tag mutation; on desync the file is quarantined read-only
    /// and the mutation aborts.
    fn check_tag_consistency(&mut self, inode_id: u64) -> Result<(), TagFsError> {
        let inode = self.slot(inode_id)?;
        let id = inode.inode_id;
        let desync = inode.tags().iter().any(|tag| !self.index.contains(tag, id));
        if desync {
            warn!("tagfs: index desync on inode {id}, quarantining");
            self.slot_mut(inode_id)?.flags |= INODE_FLAG_QUARANTINED;
            return Err(TagFsError::Quarantined);
        }
        Ok(())
    }

    /// Create a file carrying `tags`. Duplicate `(key, value)` pairs in
    /// the input collapse to one.
    pub fn create_tagged(&mut self, tags: &[Tag]) -> Result<u32, TagFsError> {
        if tags.len() > MAX_TAGS_PER_FILE {
            return Err(TagFsError::TagCapacity);
        }
        let id = self.free_ids.pop().ok_or(TagFsError::NoFreeInode)?;
        let inode = &mut self.inodes[(id - 1) as usize];
        *inode = FileInode::free_slot();
        inode.inode_id = id;
        inode.size = 0;
        for tag in tags {
            if inode.tags[..inode.tag_count as usize].contains(tag) {
                continue;
            }
            inode.tags[inode.tag_count as usize] = *tag;
            inode.tag_count += 1;
        }
        let stored: Vec<Tag> = self.inodes[(id - 1) as usize].tags().to_vec();
        for tag in stored {
            self.index.insert(tag, id);
        }
        self.sb.free_inodes -= 1;
        Ok(id)
    }

    /// Delete a file: scrub the index, free its blocks, reset the slot
    /// and return its id to the free list.
    pub fn delete(&mut self, inode_id: u64) -> Result<(), TagFsError> {
        self.check_tag_consistency(inode_id)?;
        let inode = *self.slot(inode_id)?;
        if inode.block_count > 0 {
            self.free_extent(inode.first_block, inode.block_count);
        }
        self.index.scrub_inode(inode.inode_id);
        self.inodes[(inode.inode_id - 1) as usize] = FileInode::free_slot();
        self.free_ids.push(inode.inode_id);
        self.sb.free_inodes += 1;
        Ok(())
    }

    /// Append one tag. Idempotent for an identical `(key, value)` pair;
    /// rejected at tag capacity.
    pub fn add_tag(&mut self, inode_id: u64, tag: Tag) -> Result<(), TagFsError> {
        if self.slot(inode_id)?.is_quarantined() {
            return Err(TagFsError::Quarantined);
        }
        self.check_tag_consistency(inode_id)?;
        let inode = self.slot_mut(inode_id)?;
        if inode.tags().contains(&tag) {
            return Ok(());
        }
        if inode.tag_count as usize == MAX_TAGS_PER_FILE {
            return Err(TagFsError::TagCapacity);
        }
        let id = inode.inode_id;
        inode.tags[inode.tag_count as usize] = tag;
        inode.tag_count += 1;
        self.index.insert(tag, id);
        Ok(())
    }

    /// Remove every tag whose key matches. Silent no-op if absent.
    pub fn remove_tag(&mut self, inode_id: u64, key: &[u8; TAG_KEY_LEN]) -> Result<(), TagFsError> {
        if self.slot(inode_id)?.is_quarantined() {
            return Err(TagFsError::Quarantined);
        }
        self.check_tag_consistency(inode_id)?;
        let inode = self.slot_mut(inode_id)?;
        let id = inode.inode_id;
        let mut removed: Vec<Tag> = Vec::new();
        let mut kept = 0usize;
        for i in 0..inode.tag_count as usize {
            if inode.tags[i].key_matches(key) {
                removed.push(inode.tags[i]);
            } else {
                inode.tags[kept] = inode.tags[i];
                kept += 1;
            }
        }
        inode.tag_count = kept as u32;
        for tag in &removed {
            self.index.remove(tag, id);
        }
        Ok(())
    }

    pub fn tags_of(&self, inode_id: u64) -> Result<&[Tag], TagFsError> {
        Ok(self.slot(inode_id)?.tags())
    }

    /// Multi-tag boolean query. Matches are written ascending into
    /// `out`; when more exist than fit, `count == out.len()` and the
    /// truncation flag is set.
    pub fn query(
        &self,
        op: QueryOp,
        tags: &[Tag],
        out: &mut [u64],
    ) -> Result<QueryOutcome, TagFsError> {
        let matches: BTreeSet<u32> = match op {
            QueryOp::And => {
                let mut iter = tags.iter();
                let mut set: BTreeSet<u32> = match iter.next() {
                    Some(first) => self.index.ids(first).collect(),
                    None => BTreeSet::new(),
                };
                for tag in iter {
                    let other: BTreeSet<u32> = self.index.ids(tag).collect();
                    set.retain(|id| other.contains(id));
                }
                set
            }
            QueryOp::Or => tags.iter().flat_map(|tag| self.index.ids(tag)).collect(),
            QueryOp::Not => {
                let excluded: BTreeSet<u32> = match tags.first() {
                    Some(tag) => self.index.ids(tag).collect(),
                    None => BTreeSet::new(),
                };
                self.inodes
                    .iter()
                    .filter(|inode| inode.is_live())
                    .map(|inode| inode.inode_id)
                    .filter(|id| !excluded.contains(id))
                    .collect()
            }
        };
        let count = matches.len().min(out.len());
        for (slot, id) in out.iter_mut().zip(matches.iter()) {
            *slot = *id as u64;
        }
        Ok(QueryOutcome {
            count,
            truncated: matches.len() > out.len(),
        })
    }

    /// First (lowest-id) live file whose `name` tag equals `name`.
    pub fn lookup_name(&self, name: &[u8]) -> Result<u32, TagFsError> {
        let tag = Tag::new(NAME_TAG_KEY, name).map_err(|_| TagFsError::NotFound)?;
        self.index.ids(&tag).next().ok_or(TagFsError::NotFound)
    }

    /// Read at `offset`, clamped to the file size. Returns bytes
    /// actually read.
    pub fn read(&self, inode_id: u64, offset: u64, out: &mut [u8]) -> Result<usize, TagFsError> {
        let inode = self.slot(inode_id)?;
        if offset >= inode.size {
            return Ok(0);
        }
        let len = out.len().min((inode.size - offset) as usize);
        let base = inode.first_block as usize * self.block_size + offset as usize;
        out[..len].copy_from_slice(&self.data[base..base + len]);
        Ok(len)
    }

    /// Write at `offset`, extending the backing extent when needed.
    /// Extents stay contiguous: growth past the current allocation
    /// first-fits a larger run (relocating the data if the old spot
    /// cannot be kept). Returns bytes written.
    pub fn write(&mut self, inode_id: u64, offset: u64, bytes: &[u8]) -> Result<usize, TagFsError> {
        let inode = *self.slot(inode_id)?;
        if inode.is_quarantined() {
            return Err(TagFsError::Quarantined);
        }
        if bytes.is_empty() {
            return Ok(0);
        }
        let needed = offset as usize + bytes.len();
        let capacity = inode.block_count as usize * self.block_size;
        let (first_block, block_count) = if needed > capacity {
            let new_count = needed.div_ceil(self.block_size) as u32;
            self.grow_extent(&inode, new_count)?
        } else {
            (inode.first_block, inode.block_count)
        };
        let base = first_block as usize * self.block_size + offset as usize;
        self.data[base..base + bytes.len()].copy_from_slice(bytes);
        let inode = self.slot_mut(inode_id)?;
        inode.first_block = first_block;
        inode.block_count = block_count;
        inode.size = inode.size.max(needed as u64);
        Ok(bytes.len())
    }

    pub fn stat(&self, inode_id: u64) -> Result<FileStat, TagFsError> {
        let inode = self.slot(inode_id)?;
        Ok(FileStat {
            inode_id: inode.inode_id,
            size: inode.size,
            block_count: inode.block_count,
            tag_count: inode.tag_count,
        })
    }

    pub fn live(&self) -> impl Iterator<Item = &FileInode> + '_ {
        self.inodes.iter().filter(|inode| inode.is_live())
    }

    pub fn allocated_block_count(&self) -> usize {
        self.blocks.count_ones()
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    fn free_extent(&mut self, first_block: u32, block_count: u32) {
        if self
            .blocks
            .free_range(first_block as usize, block_count as usize)
            .is_ok()
        {
            self.sb.free_blocks += block_count;
        } else {
            // Bitmap drifted from the inode table; leak the extent
            // rather than corrupt a neighbour.
            warn!("tagfs: bitmap desync freeing extent {first_block}+{block_count}");
        }
    }

    /// Allocate a `new_count`-block extent for the growing file and
    /// migrate the old contents into it.
    fn grow_extent(
        &mut self,
        inode: &FileInode,
        new_count: u32,
    ) -> Result<(u32, u32), TagFsError> {
        let old_start = inode.first_block as usize;
        let old_count = inode.block_count as usize;
        // Try while still holding the old extent.
        if let Some(start) = self.blocks.alloc_first_fit(new_count as usize) {
            self.sb.free_blocks -= new_count;
            self.install_extent(old_start, old_count, start, new_count as usize);
            if old_count > 0 {
                self.free_extent(old_start as u32, old_count as u32);
            }
            return Ok((start as u32, new_count));
        }
        if old_count == 0 {
            return Err(TagFsError::NoSpace);
        }
        // Retry with the old extent released; roll back on failure.
        self.free_extent(old_start as u32, old_count as u32);
        match self.blocks.alloc_first_fit(new_count as usize) {
            Some(start) => {
                self.sb.free_blocks -= new_count;
                self.install_extent(old_start, old_count, start, new_count as usize);
                Ok((start as u32, new_count))
            }
            None => {
                if self.blocks.reserve_range(old_start, old_count).is_ok() {
                    self.sb.free_blocks -= old_count as u32;
                }
                Err(TagFsError::NoSpace)
            }
        }
    }

    /// Copy the old contents to the new extent and zero the tail: a
    /// reused block may still hold another file's stale bytes.
    fn install_extent(
        &mut self,
        old_start: usize,
        old_count: usize,
        new_start: usize,
        new_count: usize,
    ) {
        let bs = self.block_size;
        if old_count > 0 && old_start != new_start {
            let old_base = old_start * bs;
            self.data
                .copy_within(old_base..old_base + old_count * bs, new_start * bs);
        }
        let tail_start = (new_start + old_count) * bs;
        let tail_end = (new_start + new_count) * bs;
        self.data[tail_start..tail_end].fill(0);
    }
}
