//! Little-endian payload codecs for every event type, and the result
//! layouts flowing back in responses.
//!
//! Handlers never reinterpret raw payload memory: a bounds-checked
//! cursor decodes typed values and reports `PayloadError` on short or
//! malformed input. Encoders are the user-side mirror, also used by the
//! demo binary and the integration tests.

use bytemuck::{Pod, Zeroable};
use num_enum::TryFromPrimitive;

use crate::constants::{
    EVENT_DATA_CAPACITY, MAX_PROC_NAME_LEN, MAX_TAGS_PER_FILE, QUERY_RESULT_MAX_IDS,
    RESPONSE_DATA_CAPACITY, TAG_GET_MAX_TAGS, TAG_KEY_LEN, TAG_VALUE_LEN, TAG_WIRE_LEN,
};

/// Schema violation in an event payload or response result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// Fewer bytes than the schema requires.
    Short { needed: usize, have: usize },
    /// Structurally present but semantically invalid.
    Malformed(&'static str),
}

/// Fixed-width `(key, value)` pair. Stored canonicalised: every byte
/// after the first NUL is zero, so byte equality is equality up to the
/// first NUL.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
pub struct Tag {
    pub key: [u8; TAG_KEY_LEN],
    pub value: [u8; TAG_VALUE_LEN],
}

fn canonical<const N: usize>(mut raw: [u8; N]) -> [u8; N] {
    if let Some(nul) = raw.iter().position(|&b| b == 0) {
        raw[nul..].fill(0);
    }
    raw
}

fn fill_field<const N: usize>(bytes: &[u8]) -> Result<[u8; N], PayloadError> {
    if bytes.len() > N {
        return Err(PayloadError::Malformed("tag field too long"));
    }
    let mut field = [0u8; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(canonical(field))
}

impl Tag {
    /// Build a tag from unpadded key/value bytes. Fails if either
    /// exceeds its fixed width.
    pub fn new(key: &[u8], value: &[u8]) -> Result<Self, PayloadError> {
        Ok(Self {
            key: fill_field(key)?,
            value: fill_field(value)?,
        })
    }

    /// Decode one wire tag, canonicalising both fields.
    pub fn from_wire(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.len() < TAG_WIRE_LEN {
            return Err(PayloadError::Short {
                needed: TAG_WIRE_LEN,
                have: raw.len(),
            });
        }
        let mut key = [0u8; TAG_KEY_LEN];
        key.copy_from_slice(&raw[..TAG_KEY_LEN]);
        let mut value = [0u8; TAG_VALUE_LEN];
        value.copy_from_slice(&raw[TAG_KEY_LEN..TAG_WIRE_LEN]);
        Ok(Self {
            key: canonical(key),
            value: canonical(value),
        })
    }

    /// Key bytes up to the first NUL.
    pub fn key_bytes(&self) -> &[u8] {
        let len = self.key.iter().position(|&b| b == 0).unwrap_or(TAG_KEY_LEN);
        &self.key[..len]
    }

    /// Value bytes up to the first NUL.
    pub fn value_bytes(&self) -> &[u8] {
        let len = self
            .value
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TAG_VALUE_LEN);
        &self.value[..len]
    }

    pub fn key_matches(&self, key: &[u8; TAG_KEY_LEN]) -> bool {
        self.key == canonical(*key)
    }

    fn write_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
    }
}

/// Bounds-checked little-endian cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PayloadError> {
        if self.buf.len() - self.pos < len {
            return Err(PayloadError::Short {
                needed: self.pos + len,
                have: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, PayloadError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, PayloadError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, PayloadError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn tag(&mut self) -> Result<Tag, PayloadError> {
        Tag::from_wire(self.take(TAG_WIRE_LEN)?)
    }

    fn finish(self) -> Result<(), PayloadError> {
        if self.pos != self.buf.len() {
            return Err(PayloadError::Malformed("trailing payload bytes"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Event payload schemas
// ---------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct MemoryAlloc {
    pub size: u64,
}

pub struct MemoryFree {
    pub addr: u64,
    pub size: u64,
}

pub struct MemoryMap {
    pub addr: u64,
    pub size: u64,
    pub flags: u32,
}

pub struct FileRead {
    pub fd: u32,
    pub size: u64,
}

pub struct FileWrite<'a> {
    pub fd: u32,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum QueryOp {
    And = 0,
    Or = 1,
    Not = 2,
}

pub struct FileQuery {
    pub op: QueryOp,
    pub tags: Vec<Tag>,
}

pub struct FileTagAdd {
    pub inode_id: u64,
    pub tag: Tag,
}

pub struct FileTagRemove {
    pub inode_id: u64,
    pub key: [u8; TAG_KEY_LEN],
}

pub struct ProcCreate<'a> {
    pub name: &'a [u8],
    pub entry_point: u64,
}

pub struct ProcSignal {
    pub pid: u64,
    pub signal: u32,
}

pub struct IpcSend<'a> {
    pub target_pid: u64,
    pub data: &'a [u8],
}

pub fn decode_memory_alloc(payload: &[u8]) -> Result<MemoryAlloc, PayloadError> {
    let mut r = Reader::new(payload);
    let size = r.u64()?;
    r.finish()?;
    if size == 0 {
        return Err(PayloadError::Malformed("zero-size allocation"));
    }
    Ok(MemoryAlloc { size })
}

pub fn decode_memory_free(payload: &[u8]) -> Result<MemoryFree, PayloadError> {
    let mut r = Reader::new(payload);
    let out = MemoryFree {
        addr: r.u64()?,
        size: r.u64()?,
    };
    r.finish()?;
    Ok(out)
}

pub fn decode_memory_map(payload: &[u8]) -> Result<MemoryMap, PayloadError> {
    let mut r = Reader::new(payload);
    let out = MemoryMap {
        addr: r.u64()?,
        size: r.u64()?,
        flags: r.u32()?,
    };
    r.finish()?;
    Ok(out)
}

/// FILE_OPEN / FILE_STAT: NUL-terminated path, at most 255 bytes.
pub fn decode_path(payload: &[u8]) -> Result<&[u8], PayloadError> {
    let nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or(PayloadError::Malformed("path missing NUL terminator"))?;
    if nul > 255 {
        return Err(PayloadError::Malformed("path longer than 255 bytes"));
    }
    if nul == 0 {
        return Err(PayloadError::Malformed("empty path"));
    }
    Ok(&payload[..nul])
}

/// FILE_CLOSE: `fd: u32`.
pub fn decode_fd(payload: &[u8]) -> Result<u32, PayloadError> {
    let mut r = Reader::new(payload);
    let fd = r.u32()?;
    r.finish()?;
    Ok(fd)
}

pub fn decode_file_read(payload: &[u8]) -> Result<FileRead, PayloadError> {
    let mut r = Reader::new(payload);
    let out = FileRead {
        fd: r.u32()?,
        size: r.u64()?,
    };
    r.finish()?;
    Ok(out)
}

pub fn decode_file_write(payload: &[u8]) -> Result<FileWrite<'_>, PayloadError> {
    let mut r = Reader::new(payload);
    let fd = r.u32()?;
    let size = r.u64()?;
    if size as usize > payload.len() {
        return Err(PayloadError::Malformed("write size exceeds payload"));
    }
    let bytes = r.take(size as usize)?;
    r.finish()?;
    Ok(FileWrite { fd, bytes })
}

/// FILE_CREATE_TAGGED: `tag_count: u32, tags: [Tag; tag_count]`.
pub fn decode_create_tagged(payload: &[u8]) -> Result<Vec<Tag>, PayloadError> {
    let mut r = Reader::new(payload);
    let count = r.u32()? as usize;
    if count > MAX_TAGS_PER_FILE {
        return Err(PayloadError::Malformed("tag_count exceeds per-file limit"));
    }
    let mut tags = Vec::with_capacity(count);
    for _ in 0..count {
        tags.push(r.tag()?);
    }
    r.finish()?;
    Ok(tags)
}

/// FILE_QUERY: `tag_count: u32, op: u8, _pad: [u8; 3], tags: [Tag; tag_count]`.
pub fn decode_query(payload: &[u8]) -> Result<FileQuery, PayloadError> {
    let mut r = Reader::new(payload);
    let count = r.u32()? as usize;
    let op = QueryOp::try_from(r.u8()?).map_err(|_| PayloadError::Malformed("unknown query op"))?;
    r.take(3)?; // pad
    if count == 0 {
        return Err(PayloadError::Malformed("query with no tags"));
    }
    if op == QueryOp::Not && count != 1 {
        return Err(PayloadError::Malformed("NOT takes exactly one tag"));
    }
    let mut tags = Vec::with_capacity(count);
    for _ in 0..count {
        tags.push(r.tag()?);
    }
    r.finish()?;
    Ok(FileQuery { op, tags })
}

pub fn decode_tag_add(payload: &[u8]) -> Result<FileTagAdd, PayloadError> {
    let mut r = Reader::new(payload);
    let inode_id = r.u64()?;
    let tag = r.tag()?;
    r.finish()?;
    Ok(FileTagAdd { inode_id, tag })
}

pub fn decode_tag_remove(payload: &[u8]) -> Result<FileTagRemove, PayloadError> {
    let mut r = Reader::new(payload);
    let inode_id = r.u64()?;
    let key: [u8; TAG_KEY_LEN] = r.take(TAG_KEY_LEN)?.try_into().unwrap();
    r.finish()?;
    Ok(FileTagRemove { inode_id, key })
}

/// FILE_TAG_GET / PROC_KILL / PROC_WAIT: one u64.
pub fn decode_u64(payload: &[u8]) -> Result<u64, PayloadError> {
    let mut r = Reader::new(payload);
    let v = r.u64()?;
    r.finish()?;
    Ok(v)
}

pub fn decode_proc_create(payload: &[u8]) -> Result<ProcCreate<'_>, PayloadError> {
    let mut r = Reader::new(payload);
    let name_len = r.u32()? as usize;
    if name_len == 0 || name_len > MAX_PROC_NAME_LEN {
        return Err(PayloadError::Malformed("process name length out of range"));
    }
    let name = r.take(name_len)?;
    let entry_point = r.u64()?;
    r.finish()?;
    Ok(ProcCreate { name, entry_point })
}

/// PROC_EXIT: `exit_code: u32`.
pub fn decode_exit_code(payload: &[u8]) -> Result<u32, PayloadError> {
    let mut r = Reader::new(payload);
    let code = r.u32()?;
    r.finish()?;
    Ok(code)
}

pub fn decode_proc_signal(payload: &[u8]) -> Result<ProcSignal, PayloadError> {
    let mut r = Reader::new(payload);
    let out = ProcSignal {
        pid: r.u64()?,
        signal: r.u32()?,
    };
    r.finish()?;
    Ok(out)
}

pub fn decode_ipc_send(payload: &[u8]) -> Result<IpcSend<'_>, PayloadError> {
    let mut r = Reader::new(payload);
    let target_pid = r.u64()?;
    let size = r.u64()?;
    if size as usize > payload.len() {
        return Err(PayloadError::Malformed("send size exceeds payload"));
    }
    let data = r.take(size as usize)?;
    r.finish()?;
    Ok(IpcSend { target_pid, data })
}

// ---------------------------------------------------------------------
// Event payload encoders (user side, demo, tests)
// ---------------------------------------------------------------------

pub fn encode_memory_alloc(size: u64) -> Vec<u8> {
    size.to_le_bytes().to_vec()
}

pub fn encode_memory_free(addr: u64, size: u64) -> Vec<u8> {
    let mut buf = addr.to_le_bytes().to_vec();
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

pub fn encode_memory_map(addr: u64, size: u64, flags: u32) -> Vec<u8> {
    let mut buf = addr.to_le_bytes().to_vec();
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf
}

pub fn encode_path(path: &[u8]) -> Vec<u8> {
    let mut buf = path.to_vec();
    buf.push(0);
    buf
}

pub fn encode_fd(fd: u32) -> Vec<u8> {
    fd.to_le_bytes().to_vec()
}

pub fn encode_file_read(fd: u32, size: u64) -> Vec<u8> {
    let mut buf = fd.to_le_bytes().to_vec();
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

pub fn encode_file_write(fd: u32, bytes: &[u8]) -> Vec<u8> {
    let mut buf = fd.to_le_bytes().to_vec();
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
    buf
}

pub fn encode_create_tagged(tags: &[Tag]) -> Vec<u8> {
    let mut buf = (tags.len() as u32).to_le_bytes().to_vec();
    for tag in tags {
        tag.write_wire(&mut buf);
    }
    buf
}

pub fn encode_query(op: QueryOp, tags: &[Tag]) -> Vec<u8> {
    let mut buf = (tags.len() as u32).to_le_bytes().to_vec();
    buf.push(op as u8);
    buf.extend_from_slice(&[0u8; 3]);
    for tag in tags {
        tag.write_wire(&mut buf);
    }
    buf
}

pub fn encode_tag_add(inode_id: u64, tag: &Tag) -> Vec<u8> {
    let mut buf = inode_id.to_le_bytes().to_vec();
    tag.write_wire(&mut buf);
    buf
}

pub fn encode_tag_remove(inode_id: u64, key: &[u8]) -> Vec<u8> {
    let mut buf = inode_id.to_le_bytes().to_vec();
    let field: [u8; TAG_KEY_LEN] = fill_field(key).expect("key too long");
    buf.extend_from_slice(&field);
    buf
}

pub fn encode_u64(v: u64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn encode_proc_create(name: &[u8], entry_point: u64) -> Vec<u8> {
    let mut buf = (name.len() as u32).to_le_bytes().to_vec();
    buf.extend_from_slice(name);
    buf.extend_from_slice(&entry_point.to_le_bytes());
    buf
}

pub fn encode_exit_code(code: u32) -> Vec<u8> {
    code.to_le_bytes().to_vec()
}

pub fn encode_proc_signal(pid: u64, signal: u32) -> Vec<u8> {
    let mut buf = pid.to_le_bytes().to_vec();
    buf.extend_from_slice(&signal.to_le_bytes());
    buf
}

pub fn encode_ipc_send(target_pid: u64, data: &[u8]) -> Vec<u8> {
    let mut buf = target_pid.to_le_bytes().to_vec();
    buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
    buf.extend_from_slice(data);
    buf
}

// ---------------------------------------------------------------------
// Response result layouts
// ---------------------------------------------------------------------

/// FILE_QUERY result: `{count: u32, truncated: u8, _pad: [u8; 3]}`, then
/// `count` inode ids.
pub struct QueryResult {
    pub ids: Vec<u64>,
    pub truncated: bool,
}

pub fn encode_query_result(ids: &[u64], truncated: bool) -> Vec<u8> {
    debug_assert!(ids.len() <= QUERY_RESULT_MAX_IDS);
    let mut buf = (ids.len() as u32).to_le_bytes().to_vec();
    buf.push(truncated as u8);
    buf.extend_from_slice(&[0u8; 3]);
    for id in ids {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

pub fn decode_query_result(result: &[u8]) -> Result<QueryResult, PayloadError> {
    let mut r = Reader::new(result);
    let count = r.u32()? as usize;
    let truncated = r.u8()? != 0;
    r.take(3)?;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(r.u64()?);
    }
    r.finish()?;
    Ok(QueryResult { ids, truncated })
}

/// FILE_TAG_GET result: `{total: u32, returned: u32}`, then `returned`
/// tags (as many as fit the inline result).
pub struct TagListResult {
    pub total: u32,
    pub tags: Vec<Tag>,
}

pub fn encode_tag_list(total: usize, tags: &[Tag]) -> Vec<u8> {
    debug_assert!(tags.len() <= TAG_GET_MAX_TAGS);
    let mut buf = (total as u32).to_le_bytes().to_vec();
    buf.extend_from_slice(&(tags.len() as u32).to_le_bytes());
    for tag in tags {
        tag.write_wire(&mut buf);
    }
    buf
}

pub fn decode_tag_list(result: &[u8]) -> Result<TagListResult, PayloadError> {
    let mut r = Reader::new(result);
    let total = r.u32()?;
    let returned = r.u32()? as usize;
    let mut tags = Vec::with_capacity(returned);
    for _ in 0..returned {
        tags.push(r.tag()?);
    }
    r.finish()?;
    Ok(TagListResult { total, tags })
}

/// FILE_STAT result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResult {
    pub inode_id: u64,
    pub size: u64,
    pub block_count: u32,
    pub tag_count: u32,
}

pub fn encode_stat(stat: &StatResult) -> Vec<u8> {
    let mut buf = stat.inode_id.to_le_bytes().to_vec();
    buf.extend_from_slice(&stat.size.to_le_bytes());
    buf.extend_from_slice(&stat.block_count.to_le_bytes());
    buf.extend_from_slice(&stat.tag_count.to_le_bytes());
    buf
}

pub fn decode_stat(result: &[u8]) -> Result<StatResult, PayloadError> {
    let mut r = Reader::new(result);
    let out = StatResult {
        inode_id: r.u64()?,
        size: r.u64()?,
        block_count: r.u32()?,
        tag_count: r.u32()?,
    };
    r.finish()?;
    Ok(out)
}

const _: () = assert!(EVENT_DATA_CAPACITY >= 4 + TAG_WIRE_LEN, "payload too small for one tag");
const _: () = assert!(RESPONSE_DATA_CAPACITY >= 24, "result too small for FILE_STAT");
