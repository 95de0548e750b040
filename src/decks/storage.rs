//! Storage deck: memory allocation, file operations and tag operations
//! against TagFS.
//!
//! Every handler decodes its payload up front, performs the operation,
//! and returns one `Result`; the deck framework turns that into the
//! terminal response. Result codes are stable across releases.

use std::collections::BTreeMap;

use crate::constants::{QUERY_RESULT_MAX_IDS, RESPONSE_DATA_CAPACITY, TAG_GET_MAX_TAGS};
use crate::deck::{Reply, RoutingEntry, ServiceResult};
use crate::payload;
use crate::process::IdCounter;
use crate::record::EventType;
use crate::tagfs::TagFs;
use crate::vmm::PageAllocator;

/// Stable storage result codes. 1–8 cover memory and classic file ops,
/// 10–14 the tag surface.
pub mod codes {
    pub const ALLOC_FAILURE: u32 = 1;
    pub const OPEN_FAILURE: u32 = 2;
    pub const UNKNOWN_TYPE: u32 = 3;
    pub const FREE_FAILURE: u32 = 4;
    pub const CLOSE_FAILURE: u32 = 5;
    pub const READ_FAILURE: u32 = 6;
    pub const WRITE_FAILURE: u32 = 7;
    pub const STAT_FAILURE: u32 = 8;
    pub const CREATE_TAGGED_FAILURE: u32 = 10;
    pub const QUERY_FAILURE: u32 = 11;
    pub const TAG_ADD_FAILURE: u32 = 12;
    pub const TAG_REMOVE_FAILURE: u32 = 13;
    pub const TAG_GET_FAILURE: u32 = 14;
}

/// One open file: the inode it names and the read/write cursor.
struct OpenFile {
    inode_id: u32,
    pos: u64,
}

pub struct StorageService {
    tagfs: TagFs,
    vmm: PageAllocator,
    fds: BTreeMap<u64, OpenFile>,
    /// Process-wide fd counter; fds are monotonic and never reused.
    next_fd: IdCounter,
}

impl StorageService {
    pub fn new() -> Self {
        Self {
            tagfs: TagFs::with_default_geometry(),
            vmm: PageAllocator::with_default_geometry(),
            fds: BTreeMap::new(),
            next_fd: IdCounter::new(3),
        }
    }

    pub fn tagfs(&self) -> &TagFs {
        &self.tagfs
    }

    pub fn vmm(&self) -> &PageAllocator {
        &self.vmm
    }

    pub fn open_fd_count(&self) -> usize {
        self.fds.len()
    }

    pub(crate) fn process(&mut self, entry: &RoutingEntry) -> ServiceResult {
        let event = &entry.event;
        let Ok(ty) = EventType::try_from(event.event_type) else {
            return Err(codes::UNKNOWN_TYPE);
        };
        let data = event.payload();
        match ty {
            EventType::MemoryAlloc => {
                let req = payload::decode_memory_alloc(data).map_err(|_| codes::ALLOC_FAILURE)?;
                let addr = self.vmm.alloc(req.size).map_err(|_| codes::ALLOC_FAILURE)?;
                Ok(Reply::bytes(payload::encode_u64(addr)))
            }
            EventType::MemoryFree => {
                let req = payload::decode_memory_free(data).map_err(|_| codes::FREE_FAILURE)?;
                self.vmm
                    .free(req.addr, req.size)
                    .map_err(|_| codes::FREE_FAILURE)?;
                Ok(Reply::empty())
            }
            EventType::MemoryMap => {
                // No page tables in this core: validate and acknowledge.
                payload::decode_memory_map(data).map_err(|_| codes::ALLOC_FAILURE)?;
                Ok(Reply::empty())
            }
            EventType::FileOpen => {
                let path = payload::decode_path(data).map_err(|_| codes::OPEN_FAILURE)?;
                let inode_id = self.tagfs.lookup_name(path).map_err(|_| codes::OPEN_FAILURE)?;
                let fd = self.next_fd.next();
                self.fds.insert(fd, OpenFile { inode_id, pos: 0 });
                Ok(Reply::bytes(payload::encode_u64(fd)))
            }
            EventType::FileClose => {
                let fd = payload::decode_fd(data).map_err(|_| codes::CLOSE_FAILURE)?;
                self.fds
                    .remove(&u64::from(fd))
                    .ok_or(codes::CLOSE_FAILURE)?;
                Ok(Reply::empty())
            }
            EventType::FileRead => {
                let req = payload::decode_file_read(data).map_err(|_| codes::READ_FAILURE)?;
                let file = self
                    .fds
                    .get_mut(&u64::from(req.fd))
                    .ok_or(codes::READ_FAILURE)?;
                // Reads are bounded by the inline result capacity; the
                // cursor advances by bytes actually read.
                let want = (req.size as usize).min(RESPONSE_DATA_CAPACITY);
                let mut buf = vec![0u8; want];
                let got = self
                    .tagfs
                    .read(u64::from(file.inode_id), file.pos, &mut buf)
                    .map_err(|_| codes::READ_FAILURE)?;
                file.pos += got as u64;
                buf.truncate(got);
                Ok(Reply::bytes(buf))
            }
            EventType::FileWrite => {
                let req = payload::decode_file_write(data).map_err(|_| codes::WRITE_FAILURE)?;
                let file = self
                    .fds
                    .get_mut(&u64::from(req.fd))
                    .ok_or(codes::WRITE_FAILURE)?;
                let wrote = self
                    .tagfs
                    .write(u64::from(file.inode_id), file.pos, req.bytes)
                    .map_err(|_| codes::WRITE_FAILURE)?;
                file.pos += wrote as u64;
                Ok(Reply::bytes(payload::encode_u64(wrote as u64)))
            }
            EventType::FileStat => {
                let path = payload::decode_path(data).map_err(|_| codes::STAT_FAILURE)?;
                let inode_id = self.tagfs.lookup_name(path).map_err(|_| codes::STAT_FAILURE)?;
                let stat = self
                    .tagfs
                    .stat(u64::from(inode_id))
                    .map_err(|_| codes::STAT_FAILURE)?;
                Ok(Reply::bytes(payload::encode_stat(&payload::StatResult {
                    inode_id: u64::from(stat.inode_id),
                    size: stat.size,
                    block_count: stat.block_count,
                    tag_count: stat.tag_count,
                })))
            }
            EventType::FileCreateTagged => {
                let tags =
                    payload::decode_create_tagged(data).map_err(|_| codes::CREATE_TAGGED_FAILURE)?;
                let inode_id = self
                    .tagfs
                    .create_tagged(&tags)
                    .map_err(|_| codes::CREATE_TAGGED_FAILURE)?;
                Ok(Reply::bytes(payload::encode_u64(u64::from(inode_id))))
            }
            EventType::FileQuery => {
                let query = payload::decode_query(data).map_err(|_| codes::QUERY_FAILURE)?;
                let mut ids = [0u64; QUERY_RESULT_MAX_IDS];
                let outcome = self
                    .tagfs
                    .query(query.op, &query.tags, &mut ids)
                    .map_err(|_| codes::QUERY_FAILURE)?;
                Ok(Reply::bytes(payload::encode_query_result(
                    &ids[..outcome.count],
                    outcome.truncated,
                )))
            }
            EventType::FileTagAdd => {
                let req = payload::decode_tag_add(data).map_err(|_| codes::TAG_ADD_FAILURE)?;
                self.tagfs
                    .add_tag(req.inode_id, req.tag)
                    .map_err(|_| codes::TAG_ADD_FAILURE)?;
                Ok(Reply::empty())
            }
            EventType::FileTagRemove => {
                let req = payload::decode_tag_remove(data).map_err(|_| codes::TAG_REMOVE_FAILURE)?;
                self.tagfs
                    .remove_tag(req.inode_id, &req.key)
                    .map_err(|_| codes::TAG_REMOVE_FAILURE)?;
                Ok(Reply::empty())
            }
            EventType::FileTagGet => {
                let inode_id = payload::decode_u64(data).map_err(|_| codes::TAG_GET_FAILURE)?;
                let tags = self
                    .tagfs
                    .tags_of(inode_id)
                    .map_err(|_| codes::TAG_GET_FAILURE)?;
                let returned = tags.len().min(TAG_GET_MAX_TAGS);
                Ok(Reply::bytes(payload::encode_tag_list(
                    tags.len(),
                    &tags[..returned],
                )))
            }
            // Operations-deck types never reach this handler through
            // the router; answer them like any unknown storage subtype.
            _ => Err(codes::UNKNOWN_TYPE),
        }
    }
}

impl Default for StorageService {
    fn default() -> Self {
        Self::new()
    }
}
