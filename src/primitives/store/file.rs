use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::RecordStore;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{record_crc32, record_crc32_matches, BLinkError, RecId, Result};

const LOG_MAGIC: [u8; 4] = *b"BLNK";
const LOG_FORMAT_VERSION: u16 = 1;
const FILE_HEADER_LEN: usize = 8;
const FRAME_HEADER_LEN: usize = 17;

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Statistics for a [`FileStore`].
#[derive(Clone, Debug, Default)]
pub struct FileStoreStats {
    /// Frames appended since open.
    pub frames_appended: u64,
    /// Bytes appended since open, frame headers included.
    pub bytes_appended: u64,
    /// Completed `commit` syncs.
    pub syncs: u64,
    /// Frames applied while replaying the log on open.
    pub frames_replayed: u64,
}

struct LogState {
    append_offset: u64,
    next_id: u64,
    stats: FileStoreStats,
}

/// Append-only, checksummed on-disk record store.
///
/// Every mutation appends a frame `tag:u8 | recid:u64 | len:u32 | crc32:u32 |
/// payload` to the log and updates an in-memory index, which serves all
/// reads. Opening an existing file replays the log; a frame that is torn or
/// fails its checksum ends the replay and the tail is truncated.
pub struct FileStore {
    io: Arc<dyn FileIo>,
    index: DashMap<u64, Bytes>,
    state: Mutex<LogState>,
    closed: AtomicBool,
}

impl FileStore {
    /// Opens or creates the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open(path)?);
        Self::open_with_io(io)
    }

    /// Opens a store over an arbitrary [`FileIo`] implementation.
    pub fn open_with_io(io: Arc<dyn FileIo>) -> Result<Self> {
        let len = io.len()?;
        if len > 0 && len < FILE_HEADER_LEN as u64 {
            return Err(BLinkError::corruption(format!(
                "record log header is truncated to {len} bytes"
            )));
        }
        if len == 0 {
            io.write_at(0, &encode_file_header())?;
            io.sync_all()?;
            debug!(target: "blinktree::store", "created record log");
            return Ok(Self {
                io,
                index: DashMap::new(),
                state: Mutex::new(LogState {
                    append_offset: FILE_HEADER_LEN as u64,
                    next_id: 1,
                    stats: FileStoreStats::default(),
                }),
                closed: AtomicBool::new(false),
            });
        }

        let len = usize::try_from(len)
            .map_err(|_| BLinkError::corruption("record log larger than address space"))?;
        let mut image = vec![0u8; len];
        io.read_at(0, &mut image)?;
        decode_file_header(&image[..FILE_HEADER_LEN])?;

        let index = DashMap::new();
        let mut next_id = 1u64;
        let mut offset = FILE_HEADER_LEN;
        let mut replayed = 0u64;
        while let Some((frame, frame_len)) = decode_frame(&image[offset..]) {
            next_id = next_id.max(frame.recid + 1);
            match frame.tag {
                TAG_PUT => {
                    index.insert(frame.recid, Bytes::copy_from_slice(frame.payload));
                }
                _ => {
                    index.remove(&frame.recid);
                }
            }
            offset += frame_len;
            replayed += 1;
        }
        if offset < image.len() {
            warn!(
                target: "blinktree::store",
                valid_up_to = offset,
                file_len = image.len(),
                "truncating torn record log tail"
            );
            io.truncate(offset as u64)?;
        }
        info!(
            target: "blinktree::store",
            frames = replayed,
            records = index.len(),
            "replayed record log"
        );
        Ok(Self {
            io,
            index,
            state: Mutex::new(LogState {
                append_offset: offset as u64,
                next_id,
                stats: FileStoreStats {
                    frames_replayed: replayed,
                    ..FileStoreStats::default()
                },
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns a copy of the store statistics.
    pub fn stats(&self) -> FileStoreStats {
        self.state.lock().stats.clone()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(BLinkError::Closed);
        }
        Ok(())
    }

    fn append(&self, state: &mut LogState, tag: u8, recid: u64, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| BLinkError::invalid("record larger than 4 GiB"))?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.push(tag);
        frame.extend_from_slice(&recid.to_be_bytes());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&record_crc32(tag, recid, payload).to_be_bytes());
        frame.extend_from_slice(payload);
        self.io.write_at(state.append_offset, &frame)?;
        state.append_offset += frame.len() as u64;
        state.stats.frames_appended += 1;
        state.stats.bytes_appended += frame.len() as u64;
        Ok(())
    }

    fn write_existing(&self, id: RecId, record: &[u8], op: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !self.index.contains_key(&id.0) {
            return Err(BLinkError::corruption(format!("{op} of unknown recid {id}")));
        }
        self.append(&mut state, TAG_PUT, id.0, record)?;
        self.index.insert(id.0, Bytes::copy_from_slice(record));
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn preallocate(&self) -> Result<RecId> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let id = state.next_id;
        self.append(&mut state, TAG_PUT, id, &[])?;
        state.next_id += 1;
        self.index.insert(id, Bytes::new());
        Ok(RecId(id))
    }

    fn put(&self, record: &[u8]) -> Result<RecId> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let id = state.next_id;
        self.append(&mut state, TAG_PUT, id, record)?;
        state.next_id += 1;
        self.index.insert(id, Bytes::copy_from_slice(record));
        Ok(RecId(id))
    }

    fn update(&self, id: RecId, record: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.write_existing(id, record, "update")
    }

    fn get(&self, id: RecId) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.index.get(&id.0).map(|slot| slot.value().clone()))
    }

    fn delete(&self, id: RecId) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if !self.index.contains_key(&id.0) {
            return Err(BLinkError::corruption(format!(
                "delete of unknown recid {id}"
            )));
        }
        self.append(&mut state, TAG_DELETE, id.0, &[])?;
        self.index.remove(&id.0);
        Ok(())
    }

    fn compare_and_swap(&self, id: RecId, expected: &[u8], new: &[u8]) -> Result<bool> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let matches = match self.index.get(&id.0) {
            Some(current) => current.as_ref() == expected,
            None => {
                return Err(BLinkError::corruption(format!(
                    "compare-and-swap of unknown recid {id}"
                )))
            }
        };
        if !matches {
            return Ok(false);
        }
        self.append(&mut state, TAG_PUT, id.0, new)?;
        self.index.insert(id.0, Bytes::copy_from_slice(new));
        Ok(true)
    }

    fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        self.io.sync_all()?;
        state.stats.syncs += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, AtomicOrdering::AcqRel) {
            return Ok(());
        }
        let state = self.state.lock();
        self.io.sync_all()?;
        debug!(
            target: "blinktree::store",
            frames = state.stats.frames_appended,
            bytes = state.stats.bytes_appended,
            "closed record log"
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

struct Frame<'a> {
    tag: u8,
    recid: u64,
    payload: &'a [u8],
}

fn encode_file_header() -> [u8; FILE_HEADER_LEN] {
    let mut buf = [0u8; FILE_HEADER_LEN];
    buf[0..4].copy_from_slice(&LOG_MAGIC);
    buf[4..6].copy_from_slice(&LOG_FORMAT_VERSION.to_be_bytes());
    buf
}

fn decode_file_header(src: &[u8]) -> Result<()> {
    if src[0..4] != LOG_MAGIC {
        return Err(BLinkError::corruption("record log magic mismatch"));
    }
    let version = u16::from_be_bytes([src[4], src[5]]);
    if version != LOG_FORMAT_VERSION {
        return Err(BLinkError::corruption(format!(
            "unsupported record log version {version}"
        )));
    }
    Ok(())
}

/// Decodes the frame at the head of `src`, returning it with its total
/// length, or `None` when the bytes do not form a complete valid frame.
fn decode_frame(src: &[u8]) -> Option<(Frame<'_>, usize)> {
    let header = src.get(..FRAME_HEADER_LEN)?;
    let tag = header[0];
    if tag != TAG_PUT && tag != TAG_DELETE {
        return None;
    }
    let recid = u64::from_be_bytes(header[1..9].try_into().ok()?);
    let len = u32::from_be_bytes(header[9..13].try_into().ok()?) as usize;
    let crc = u32::from_be_bytes(header[13..17].try_into().ok()?);
    let payload = src.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)?;
    if !record_crc32_matches(crc, tag, recid, payload) {
        return None;
    }
    Some((
        Frame {
            tag,
            recid,
            payload,
        },
        FRAME_HEADER_LEN + len,
    ))
}
