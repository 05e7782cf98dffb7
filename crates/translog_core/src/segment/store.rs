//! A single segment file.

use crate::config::Encoding;
use crate::error::{TransLogError, TransLogResult};
use crate::packet::{encode_entries, Packet, MAX_BLOCK_PAYLOAD};
use crate::segment::block::{encode_block, read_block, BlockRead};
use crate::segment::header::{FileHeaderContext, SegmentHeader};
use crate::segment::segment_file_name;
use crate::types::{SerialNum, SerialNumRange};
use parking_lot::{Mutex, RwLock};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};
use translog_storage::{FileBackend, StorageBackend};

/// How a segment file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    /// The tail of a domain: created if missing, a torn final block is cut
    /// away, and packets may be appended.
    Append,
    /// An older segment of a domain: must exist and be fully valid.
    Closed,
    /// Read-only access for tools. The file is never modified and a torn
    /// final block is ignored.
    Inspect,
}

/// Position of one block in the file.
#[derive(Debug, Clone, Copy)]
struct BlockInfo {
    offset: u64,
    first: SerialNum,
    last: SerialNum,
    count: u64,
}

#[derive(Debug)]
struct SegmentState {
    range: SerialNumRange,
    count: u64,
    blocks: Vec<BlockInfo>,
}

/// An append-only, range-addressed segment file.
///
/// A segment starting at serial `S` covers the range `(S - 1, last]`, where
/// `last` is the last serial appended; while empty its range is
/// `(S - 1, S - 1]`. All methods take `&self` so the domain writer, the sync
/// task and visiting sessions can share one segment.
pub struct Segment {
    domain: String,
    path: PathBuf,
    file_name: String,
    start: SerialNum,
    encoding: Encoding,
    compression_level: u8,
    backend: Box<dyn StorageBackend>,
    state: RwLock<SegmentState>,
    write_lock: Mutex<()>,
    synced: AtomicU64,
    closed: AtomicBool,
    erased: AtomicBool,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("file_name", &self.file_name)
            .field("range", &self.range())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Segment {
    /// Opens the segment of `domain` in `dir` that starts at `start`.
    ///
    /// `encoding` and `compression_level` are recorded in the header of a
    /// newly created file; an existing file keeps the values it was
    /// created with.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created, if its
    /// header does not describe this segment, or if it holds an invalid
    /// block that the mode does not allow to be discarded.
    pub fn open(
        domain: &str,
        dir: &Path,
        start: SerialNum,
        encoding: Encoding,
        compression_level: u8,
        header_context: &dyn FileHeaderContext,
        mode: SegmentMode,
    ) -> TransLogResult<Self> {
        let file_name = segment_file_name(domain, start);
        let path = dir.join(&file_name);
        let backend = match mode {
            SegmentMode::Append => FileBackend::open(&path)?,
            SegmentMode::Closed => {
                if !path.is_file() {
                    return Err(TransLogError::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("missing segment {}", path.display()),
                    )));
                }
                FileBackend::open(&path)?
            }
            SegmentMode::Inspect => FileBackend::open_read_only(&path)?,
        };
        Self::with_backend(
            domain,
            path,
            start,
            encoding,
            compression_level,
            header_context,
            mode,
            Box::new(backend),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_backend(
        domain: &str,
        path: PathBuf,
        start: SerialNum,
        encoding: Encoding,
        compression_level: u8,
        header_context: &dyn FileHeaderContext,
        mode: SegmentMode,
        backend: Box<dyn StorageBackend>,
    ) -> TransLogResult<Self> {
        let file_name = segment_file_name(domain, start);
        let empty = start.saturating_sub(1);

        let mut segment = Self {
            domain: domain.to_string(),
            path,
            file_name,
            start,
            encoding,
            compression_level,
            backend,
            state: RwLock::new(SegmentState {
                range: SerialNumRange::new(empty, empty),
                count: 0,
                blocks: Vec::new(),
            }),
            write_lock: Mutex::new(()),
            synced: AtomicU64::new(0),
            closed: AtomicBool::new(mode != SegmentMode::Append),
            erased: AtomicBool::new(false),
        };

        if segment.backend.size()? == 0 && mode == SegmentMode::Append {
            segment.write_header(header_context)?;
        } else {
            let data_start = segment.read_header()?;
            segment.recover(data_start, mode)?;
            // Whatever survived on disk from an earlier run is durable.
            let to = segment.state.get_mut().range.to();
            if segment.state.get_mut().count > 0 {
                segment.synced.store(to, Ordering::Release);
            }
        }

        Ok(segment)
    }

    fn write_header(&self, header_context: &dyn FileHeaderContext) -> TransLogResult<()> {
        let mut header = SegmentHeader::new(self.encoding, self.compression_level, self.start);
        header.put_tag("desc", format!("Transaction log segment of domain {}", self.domain));
        header_context.add_tags(&mut header, &self.file_name);
        self.backend.append(&header.encode())?;
        self.backend.sync()?;
        Ok(())
    }

    fn read_header(&mut self) -> TransLogResult<u64> {
        let preamble_size = SegmentHeader::preamble_size();
        let size = self.backend.size()?;
        if size < preamble_size as u64 {
            return Err(TransLogError::segment_corruption(&self.file_name, "file too short"));
        }
        let preamble = self.backend.read_at(0, preamble_size)?;
        let body_len = SegmentHeader::body_len(&self.file_name, &preamble)?;
        if (preamble_size + body_len) as u64 > size {
            return Err(TransLogError::segment_corruption(&self.file_name, "header runs past end"));
        }
        let body = self.backend.read_at(preamble_size as u64, body_len)?;
        let header = SegmentHeader::decode_body(&self.file_name, &body)?;
        if header.start != self.start {
            return Err(TransLogError::segment_corruption(
                &self.file_name,
                format!("header claims start {}", header.start),
            ));
        }
        self.encoding = header.encoding;
        self.compression_level = header.compression_level;
        Ok((preamble_size + body_len) as u64)
    }

    /// Rebuilds the block index, discarding a bad tail where allowed.
    fn recover(&mut self, data_start: u64, mode: SegmentMode) -> TransLogResult<()> {
        let size = self.backend.size()?;
        let mut offset = data_start;
        let state = self.state.get_mut();

        while offset < size {
            let problem = match read_block(self.backend.as_ref(), offset, size)? {
                BlockRead::Valid { payload, len } => {
                    let packet = Packet::decode(&payload).map_err(|e| {
                        TransLogError::segment_corruption(&self.file_name, e.to_string())
                    })?;
                    let range = packet.range();
                    if packet.is_empty() || range.from() < state.range.to() || range.to() < self.start {
                        return Err(TransLogError::segment_corruption(
                            &self.file_name,
                            format!("block {range} at offset {offset} is out of order"),
                        ));
                    }
                    state.blocks.push(BlockInfo {
                        offset,
                        first: range.from() + 1,
                        last: range.to(),
                        count: packet.len() as u64,
                    });
                    state.count += packet.len() as u64;
                    state.range.set_to(range.to());
                    offset += len;
                    continue;
                }
                BlockRead::Torn => None,
                BlockRead::Corrupt(message) => Some(message),
            };

            match mode {
                SegmentMode::Append => {
                    warn!(
                        segment = %self.file_name,
                        offset,
                        discarded = size - offset,
                        reason = problem.as_deref().unwrap_or("torn block"),
                        "truncating invalid tail of segment"
                    );
                    self.backend.truncate(offset)?;
                }
                SegmentMode::Inspect if problem.is_none() => {
                    warn!(segment = %self.file_name, offset, "ignoring torn tail of segment");
                }
                SegmentMode::Inspect | SegmentMode::Closed => {
                    let message = problem.unwrap_or_else(|| format!("torn block at offset {offset}"));
                    return Err(TransLogError::segment_corruption(&self.file_name, message));
                }
            }
            break;
        }

        debug!(
            segment = %self.file_name,
            range = %state.range,
            entries = state.count,
            "opened segment"
        );
        Ok(())
    }

    /// Appends a packet, framed as one block unless its payload exceeds
    /// [`MAX_BLOCK_PAYLOAD`].
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is closed, the packet does not
    /// follow the last appended serial, or the write fails.
    pub fn commit(&self, packet: &Packet) -> TransLogResult<()> {
        if self.is_closed() {
            return Err(TransLogError::SegmentClosed {
                file: self.file_name.clone(),
            });
        }
        if packet.is_empty() {
            return Ok(());
        }
        let range = packet.range();
        if range.to() < self.start {
            return Err(TransLogError::invalid_packet(format!(
                "packet {range} precedes segment start {}",
                self.start
            )));
        }

        let _guard = self.write_lock.lock();
        {
            let state = self.state.read();
            if state.count > 0 && range.from() < state.range.to() {
                return Err(TransLogError::invalid_packet(format!(
                    "packet {range} does not follow {}",
                    state.range
                )));
            }
        }

        self.append_blocks(packet, MAX_BLOCK_PAYLOAD)
    }

    /// Writes `packet` as consecutive blocks of at most `limit` payload
    /// bytes in a single append. Caller holds the write lock.
    fn append_blocks(&self, packet: &Packet, limit: usize) -> TransLogResult<()> {
        let mut data = Vec::new();
        let mut pending = Vec::new();
        for run in packet.runs_within(limit) {
            let (Some(first), Some(last)) = (run.first(), run.last()) else {
                continue;
            };
            let Some(block) = encode_block(self.encoding, &encode_entries(run)) else {
                return Err(TransLogError::invalid_packet(format!(
                    "entries {}..={} do not fit one block",
                    first.serial, last.serial
                )));
            };
            pending.push(BlockInfo {
                offset: data.len() as u64,
                first: first.serial,
                last: last.serial,
                count: run.len() as u64,
            });
            data.extend_from_slice(&block);
        }

        let base = self.backend.append(&data)?;
        self.backend.flush()?;

        let mut state = self.state.write();
        for mut block in pending {
            block.offset += base;
            state.blocks.push(block);
        }
        state.count += packet.len() as u64;
        state.range.set_to(packet.range().to());
        Ok(())
    }

    /// Makes every appended block durable.
    ///
    /// Safe to call concurrently with `commit`; only blocks that were
    /// complete when the sync started are reported as synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails; the synced mark is not advanced.
    pub fn sync(&self) -> TransLogResult<()> {
        let target = self.state.read().range.to();
        if self.erased.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.sync()?;
        self.synced.fetch_max(target, Ordering::AcqRel);
        Ok(())
    }

    /// Syncs and closes the segment for appends.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> TransLogResult<()> {
        let _guard = self.write_lock.lock();
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.sync()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    /// Erases every serial up to and including `to`.
    ///
    /// When `to` lies past the last serial of the segment the file is
    /// removed. Otherwise the segment is trimmed in memory: the lower bound
    /// of its range moves up to `to` and visits no longer return the
    /// erased serials.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed or a partially
    /// erased block cannot be read.
    pub fn erase(&self, to: SerialNum) -> TransLogResult<()> {
        let _guard = self.write_lock.lock();
        let mut state = self.state.write();

        if to > state.range.to() {
            self.closed.store(true, Ordering::Release);
            self.erased.store(true, Ordering::Release);
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            state.blocks.clear();
            state.count = 0;
            let end = state.range.to();
            state.range.set_from(end);
            debug!(segment = %self.file_name, "removed segment file");
            return Ok(());
        }

        if to <= state.range.from() {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(state.blocks.len());
        let mut count = 0u64;
        for block in state.blocks.iter().copied() {
            if block.last <= to {
                continue;
            }
            if block.first <= to {
                let packet = self.read_packet(block.offset)?;
                let remaining: Vec<_> = packet.entries().iter().filter(|e| e.serial > to).collect();
                let first = remaining.first().map_or(block.last, |e| e.serial);
                let trimmed = BlockInfo {
                    first,
                    count: remaining.len() as u64,
                    ..block
                };
                count += trimmed.count;
                kept.push(trimmed);
            } else {
                count += block.count;
                kept.push(block);
            }
        }
        state.blocks = kept;
        state.count = count;
        state.range.set_from(to);
        Ok(())
    }

    /// Calls `f` with the entries of `range` held by this segment, in
    /// ascending serial order, one packet per stored block.
    ///
    /// Returns `false` as soon as `f` does.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be read.
    pub fn visit<F>(&self, range: SerialNumRange, mut f: F) -> TransLogResult<bool>
    where
        F: FnMut(Packet) -> bool,
    {
        let (blocks, lower) = {
            let state = self.state.read();
            let lower = range.from().max(state.range.from());
            let blocks: Vec<BlockInfo> = state
                .blocks
                .iter()
                .filter(|b| b.last > lower && b.first <= range.to())
                .copied()
                .collect();
            (blocks, lower)
        };

        for block in blocks {
            let packet = self.read_packet(block.offset)?;
            let wanted = Packet::from_entries(
                packet
                    .into_entries()
                    .into_iter()
                    .filter(|e| e.serial > lower && e.serial <= range.to()),
            )?;
            if wanted.is_empty() {
                continue;
            }
            if !f(wanted) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read_packet(&self, offset: u64) -> TransLogResult<Packet> {
        let size = self.backend.size()?;
        match read_block(self.backend.as_ref(), offset, size)? {
            BlockRead::Valid { payload, .. } => Packet::decode(&payload),
            BlockRead::Torn => Err(TransLogError::segment_corruption(
                &self.file_name,
                format!("torn block at offset {offset}"),
            )),
            BlockRead::Corrupt(message) => {
                Err(TransLogError::segment_corruption(&self.file_name, message))
            }
        }
    }

    /// Returns the range of serials held.
    #[must_use]
    pub fn range(&self) -> SerialNumRange {
        self.state.read().range
    }

    /// Returns the number of entries held.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.read().count
    }

    /// Returns the size of the file in bytes.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        if self.erased.load(Ordering::Acquire) {
            return 0;
        }
        self.backend.size().unwrap_or(0)
    }

    /// Returns the last serial known to be durable, 0 if none.
    #[must_use]
    pub fn synced(&self) -> SerialNum {
        self.synced.load(Ordering::Acquire)
    }

    /// Returns the first serial the segment may hold.
    #[must_use]
    pub fn start(&self) -> SerialNum {
        self.start
    }

    /// Returns the file name of the segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the full path of the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the encoding of the blocks this segment writes.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the compression level recorded in the header.
    #[must_use]
    pub fn compression_level(&self) -> u8 {
        self.compression_level
    }

    /// Returns `true` once the segment no longer accepts appends.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Entry;
    use crate::segment::VersionHeaderContext;
    use tempfile::tempdir;
    use translog_storage::{InMemoryBackend, StorageResult};

    fn packet(serials: &[SerialNum]) -> Packet {
        Packet::from_entries(serials.iter().map(|&s| Entry::new(s, 0, format!("doc-{s}")))).unwrap()
    }

    fn open(dir: &Path, start: SerialNum, mode: SegmentMode) -> TransLogResult<Segment> {
        Segment::open("docs", dir, start, Encoding::Crc32, 3, &VersionHeaderContext, mode)
    }

    fn collect(segment: &Segment, range: SerialNumRange) -> Vec<SerialNum> {
        let mut serials = Vec::new();
        segment
            .visit(range, |p| {
                serials.extend(p.entries().iter().map(|e| e.serial));
                true
            })
            .unwrap();
        serials
    }

    #[test]
    fn new_segment_is_empty() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();

        assert_eq!(segment.range(), SerialNumRange::new(0, 0));
        assert_eq!(segment.size(), 0);
        assert_eq!(segment.synced(), 0);
        assert!(segment.byte_size() > 0);
        assert!(!segment.is_closed());
        assert!(dir.path().join("docs-0000000000000001").is_file());
    }

    #[test]
    fn commit_extends_range() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();

        segment.commit(&packet(&[1, 2])).unwrap();
        segment.commit(&packet(&[5])).unwrap();

        assert_eq!(segment.range(), SerialNumRange::new(0, 5));
        assert_eq!(segment.size(), 3);
        assert_eq!(collect(&segment, SerialNumRange::new(0, 10)), vec![1, 2, 5]);
        assert_eq!(collect(&segment, SerialNumRange::new(1, 2)), vec![2]);
    }

    #[test]
    fn commit_rejects_overlap() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        segment.commit(&packet(&[1, 2])).unwrap();

        assert!(segment.commit(&packet(&[2, 3])).is_err());
        assert_eq!(segment.size(), 2);
    }

    #[test]
    fn sync_advances_synced_mark() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        segment.commit(&packet(&[1, 2, 3])).unwrap();
        assert_eq!(segment.synced(), 0);

        segment.sync().unwrap();
        assert_eq!(segment.synced(), 3);
        segment.sync().unwrap();
        assert_eq!(segment.synced(), 3);
    }

    #[test]
    fn closed_segment_rejects_commit() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        segment.commit(&packet(&[1])).unwrap();
        segment.close().unwrap();

        assert!(segment.is_closed());
        assert_eq!(segment.synced(), 1);
        assert!(matches!(
            segment.commit(&packet(&[2])),
            Err(TransLogError::SegmentClosed { .. })
        ));
    }

    #[test]
    fn reopen_restores_contents() {
        let dir = tempdir().unwrap();
        {
            let segment = open(dir.path(), 10, SegmentMode::Append).unwrap();
            segment.commit(&packet(&[10, 11])).unwrap();
            segment.commit(&packet(&[12])).unwrap();
        }

        let segment = open(dir.path(), 10, SegmentMode::Closed).unwrap();
        assert!(segment.is_closed());
        assert_eq!(segment.range(), SerialNumRange::new(9, 12));
        assert_eq!(segment.size(), 3);
        assert_eq!(segment.synced(), 12);
        assert_eq!(collect(&segment, SerialNumRange::new(0, 100)), vec![10, 11, 12]);
    }

    #[test]
    fn torn_tail_is_truncated_when_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs-0000000000000001");
        let intact_size = {
            let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
            segment.commit(&packet(&[1])).unwrap();
            let size = segment.byte_size();
            segment.commit(&packet(&[2])).unwrap();
            size
        };
        let full = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        assert!(open(dir.path(), 1, SegmentMode::Closed).is_err());
        let inspected = open(dir.path(), 1, SegmentMode::Inspect).unwrap();
        assert_eq!(inspected.range(), SerialNumRange::new(0, 1));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), full - 3);
        drop(inspected);

        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        assert_eq!(segment.range(), SerialNumRange::new(0, 1));
        assert_eq!(segment.byte_size(), intact_size);
        segment.commit(&packet(&[2])).unwrap();
        assert_eq!(segment.size(), 2);
    }

    #[test]
    fn corrupt_block_fails_closed_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs-0000000000000001");
        {
            let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
            segment.commit(&packet(&[1])).unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            open(dir.path(), 1, SegmentMode::Closed),
            Err(TransLogError::SegmentCorruption { .. })
        ));
        assert!(open(dir.path(), 1, SegmentMode::Inspect).is_err());
    }

    #[test]
    fn header_must_match_start() {
        let dir = tempdir().unwrap();
        drop(open(dir.path(), 1, SegmentMode::Append).unwrap());
        std::fs::rename(
            dir.path().join("docs-0000000000000001"),
            dir.path().join("docs-0000000000000002"),
        )
        .unwrap();
        assert!(open(dir.path(), 2, SegmentMode::Closed).is_err());
    }

    #[test]
    fn erase_trims_front_then_removes_file() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        segment.commit(&packet(&[1, 2, 3])).unwrap();
        segment.commit(&packet(&[4, 5])).unwrap();

        segment.erase(2).unwrap();
        assert_eq!(segment.range(), SerialNumRange::new(2, 5));
        assert_eq!(segment.size(), 3);
        assert_eq!(collect(&segment, SerialNumRange::new(0, 10)), vec![3, 4, 5]);

        segment.erase(4).unwrap();
        assert_eq!(segment.size(), 1);
        assert_eq!(collect(&segment, SerialNumRange::new(0, 10)), vec![5]);

        segment.erase(6).unwrap();
        assert!(!segment.path().exists());
        assert_eq!(segment.size(), 0);
        assert!(segment.is_closed());
    }

    #[test]
    fn visit_stops_when_callback_declines() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 1, SegmentMode::Append).unwrap();
        segment.commit(&packet(&[1])).unwrap();
        segment.commit(&packet(&[2])).unwrap();

        let mut seen = 0;
        let completed = segment
            .visit(SerialNumRange::new(0, 2), |_| {
                seen += 1;
                false
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(seen, 1);
    }

    #[test]
    fn in_memory_segment() {
        let backend = InMemoryBackend::new();
        let segment = Segment::with_backend(
            "docs",
            PathBuf::from("docs-0000000000000001"),
            1,
            Encoding::None,
            0,
            &VersionHeaderContext,
            SegmentMode::Append,
            Box::new(backend),
        )
        .unwrap();
        segment.commit(&packet(&[1, 2])).unwrap();
        assert_eq!(collect(&segment, SerialNumRange::new(0, 2)), vec![1, 2]);
    }

    struct Shared(std::sync::Arc<InMemoryBackend>);

    impl StorageBackend for Shared {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.0.read_at(offset, len)
        }
        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            self.0.append(data)
        }
        fn flush(&self) -> StorageResult<()> {
            self.0.flush()
        }
        fn size(&self) -> StorageResult<u64> {
            self.0.size()
        }
        fn sync(&self) -> StorageResult<()> {
            self.0.sync()
        }
        fn truncate(&self, new_size: u64) -> StorageResult<()> {
            self.0.truncate(new_size)
        }
    }

    fn memory_segment(backend: Box<dyn StorageBackend>) -> Segment {
        Segment::with_backend(
            "docs",
            PathBuf::from("docs-0000000000000001"),
            1,
            Encoding::Crc32,
            0,
            &VersionHeaderContext,
            SegmentMode::Append,
            backend,
        )
        .unwrap()
    }

    #[test]
    fn crash_loses_only_unsynced_blocks() {
        let backend = std::sync::Arc::new(InMemoryBackend::new());
        let segment = memory_segment(Box::new(Shared(std::sync::Arc::clone(&backend))));
        segment.commit(&packet(&[1, 2])).unwrap();
        segment.sync().unwrap();
        segment.commit(&packet(&[3])).unwrap();
        drop(segment);

        let recovered = memory_segment(Box::new(backend.after_crash()));
        assert_eq!(recovered.range(), SerialNumRange::new(0, 2));
        assert_eq!(recovered.synced(), 2);
        recovered.commit(&packet(&[3, 4])).unwrap();
        assert_eq!(collect(&recovered, SerialNumRange::tail(0)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn oversized_packet_spans_several_blocks() {
        let backend = std::sync::Arc::new(InMemoryBackend::new());
        let segment = memory_segment(Box::new(Shared(std::sync::Arc::clone(&backend))));
        let big = packet(&[1, 2, 3, 4, 5]);
        let limit = 2 * big.entries()[0].encoded_len();

        {
            let _guard = segment.write_lock.lock();
            segment.append_blocks(&big, limit).unwrap();
        }
        assert_eq!(segment.state.read().blocks.len(), 3);
        assert_eq!(segment.range(), SerialNumRange::new(0, 5));
        assert_eq!(collect(&segment, SerialNumRange::new(2, 4)), vec![3, 4]);
        segment.commit(&packet(&[6])).unwrap();
        drop(segment);

        let reopened = memory_segment(Box::new(InMemoryBackend::with_data(backend.data())));
        assert_eq!(reopened.state.read().blocks.len(), 4);
        assert_eq!(reopened.size(), 6);
        assert_eq!(collect(&reopened, SerialNumRange::tail(0)), vec![1, 2, 3, 4, 5, 6]);
    }

    struct FailingSync(InMemoryBackend);

    impl StorageBackend for FailingSync {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.0.read_at(offset, len)
        }
        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            self.0.append(data)
        }
        fn flush(&self) -> StorageResult<()> {
            Ok(())
        }
        fn size(&self) -> StorageResult<u64> {
            self.0.size()
        }
        fn sync(&self) -> StorageResult<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk gone").into())
        }
        fn truncate(&self, new_size: u64) -> StorageResult<()> {
            self.0.truncate(new_size)
        }
    }

    #[test]
    fn failed_sync_is_not_reported_as_synced() {
        let header = SegmentHeader::new(Encoding::Crc32, 0, 1).encode();
        let backend = FailingSync(InMemoryBackend::with_data(header));
        let segment = Segment::with_backend(
            "docs",
            PathBuf::from("docs-0000000000000001"),
            1,
            Encoding::Crc32,
            0,
            &VersionHeaderContext,
            SegmentMode::Append,
            Box::new(backend),
        )
        .unwrap();
        segment.commit(&packet(&[1])).unwrap();

        assert!(segment.sync().is_err());
        assert_eq!(segment.synced(), 0);
        assert!(segment.close().is_err());
        assert!(!segment.is_closed());
    }
}
