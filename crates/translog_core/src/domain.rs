//! The domain: supervisor of one transaction log.
//!
//! A domain owns an ordered set of segments, the active [`Chunk`] and the
//! visiting sessions. Producers commit packets from any thread; commits are
//! merged into the active chunk under a short lock and handed to the
//! domain's single writer once the chunk grows too large or too old. The
//! writer appends to the open segment, rotates to a new segment when the
//! open one exceeds its size limit, and resolves the commit completions.
//!
//! # Durability
//!
//! A completion resolves with `Ok` once the chunk is written, and once it
//! is synced when `fsync_on_commit` is set. A failed write or sync marks the
//! domain failed: the completions of the affected chunk and every later
//! commit resolve with [`TransLogError::DomainFailed`].

use crate::chunk::{Chunk, DoneCallback};
use crate::config::DomainConfig;
use crate::dir::DomainDir;
use crate::error::{TransLogError, TransLogResult};
use crate::executor::{Executor, Task, ThreadPool};
use crate::packet::Packet;
use crate::segment::{scan_dir, FileHeaderContext, Segment, SegmentMode};
use crate::session::{session_task, Destination, Session, SessionId};
use crate::types::{SerialNum, SerialNumRange};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Snapshot of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Serials held.
    pub range: SerialNumRange,
    /// Number of entries.
    pub size: u64,
    /// File size in bytes.
    pub byte_size: u64,
    /// File name inside the domain directory.
    pub file_name: String,
}

/// Snapshot of a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    /// `(begin, end]` of the domain.
    pub range: SerialNumRange,
    /// Number of entries over all segments.
    pub size: u64,
    /// Bytes over all segment files.
    pub byte_size: u64,
    /// Longest run time of a closed session.
    pub max_session_run_time: Duration,
    /// Segments in serial order.
    pub segments: Vec<SegmentInfo>,
}

/// Waits for the resolution of one commit.
#[derive(Debug)]
pub struct CommitHandle {
    rx: mpsc::Receiver<TransLogResult<()>>,
}

impl CommitHandle {
    /// Blocks until the commit resolves.
    ///
    /// # Errors
    ///
    /// Returns the error the commit resolved with, or `CommitAbandoned` if
    /// its chunk was dropped without being written.
    pub fn wait(self) -> TransLogResult<()> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(TransLogError::CommitAbandoned))
    }

    /// Blocks for at most `timeout`; `None` if the commit is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TransLogResult<()>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(TransLogError::CommitAbandoned)),
        }
    }

    /// Returns the resolution if it is already available.
    pub fn try_wait(&self) -> Option<TransLogResult<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(TransLogError::CommitAbandoned)),
        }
    }
}

struct CurrentChunk {
    chunk: Chunk,
    last_serial: SerialNum,
}

#[derive(Default)]
struct SyncMonitor {
    pending: Mutex<bool>,
    done: Condvar,
}

impl SyncMonitor {
    fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending {
            self.done.wait(&mut pending);
        }
    }

    fn finish(&self) {
        let mut pending = self.pending.lock();
        *pending = false;
        self.done.notify_all();
    }
}

/// State shared by the domain handle, its writer and its tasks.
pub(crate) struct DomainCore {
    name: String,
    dir: DomainDir,
    config: RwLock<DomainConfig>,
    header_context: Arc<dyn FileHeaderContext>,
    current: Mutex<CurrentChunk>,
    segments: RwLock<BTreeMap<SerialNum, Arc<Segment>>>,
    sessions: Mutex<BTreeMap<SessionId, Arc<Session>>>,
    next_session_id: AtomicU32,
    sync_monitor: Arc<SyncMonitor>,
    erase_lock: Mutex<()>,
    commit_pool: Arc<dyn Executor>,
    session_pool: Arc<dyn Executor>,
    max_session_run_time: Mutex<Duration>,
    failure: Mutex<Option<String>>,
}

/// A transaction log domain.
///
/// Dropping the domain writes any pending chunk, waits for the writer to
/// drain, stops running sessions and releases the domain directory.
pub struct Domain {
    core: Arc<DomainCore>,
    writer: ThreadPool,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.core.name)
            .field("range", &self.core.range())
            .finish()
    }
}

impl Domain {
    /// Opens or creates the domain `name` under `base_dir`.
    ///
    /// Existing segments are opened concurrently on `session_pool`. Every
    /// segment but the last is closed; an empty last segment following
    /// other segments is discarded. A fresh open segment is created when
    /// none is left open.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionFailure` if a directory cannot be created,
    /// `DomainLocked` if another owner holds the domain, or the error of a
    /// segment that fails to open.
    pub fn open(
        name: &str,
        base_dir: &Path,
        commit_pool: Arc<dyn Executor>,
        session_pool: Arc<dyn Executor>,
        config: DomainConfig,
        header_context: Arc<dyn FileHeaderContext>,
    ) -> TransLogResult<Self> {
        let dir = DomainDir::open(base_dir, name)?;
        let starts = scan_dir(dir.path(), name)?;
        let last = starts.last().copied();

        let opened = Arc::new(Mutex::new(Vec::with_capacity(starts.len())));
        for &start in &starts {
            let mode = if Some(start) == last {
                SegmentMode::Append
            } else {
                SegmentMode::Closed
            };
            let opened = Arc::clone(&opened);
            let domain = name.to_string();
            let path = dir.path().to_path_buf();
            let header_context = Arc::clone(&header_context);
            let (encoding, level) = (config.encoding, config.compression_level);
            session_pool.execute(Box::new(move || {
                let result = Segment::open(
                    &domain,
                    &path,
                    start,
                    encoding,
                    level,
                    header_context.as_ref(),
                    mode,
                );
                opened.lock().push((start, result));
            }))?;
        }
        session_pool.sync();

        let mut segments = BTreeMap::new();
        for (start, result) in std::mem::take(&mut *opened.lock()) {
            segments.insert(start, Arc::new(result?));
        }

        let empty_tail = segments
            .last_key_value()
            .filter(|(_, segment)| segments.len() > 1 && segment.size() == 0)
            .map(|(&start, segment)| (start, Arc::clone(segment)));
        if let Some((start, segment)) = empty_tail {
            segment.erase(segment.range().to() + 1)?;
            segments.remove(&start);
            info!(domain = name, segment = segment.file_name(), "discarded empty tail segment");
        }

        let needs_fresh = segments
            .last_key_value()
            .map_or(true, |(_, segment)| segment.is_closed());
        if needs_fresh {
            let start = end_of(&segments) + 1;
            let segment = Segment::open(
                name,
                dir.path(),
                start,
                config.encoding,
                config.compression_level,
                header_context.as_ref(),
                SegmentMode::Append,
            )?;
            segments.insert(start, Arc::new(segment));
            dir.sync()?;
        }

        let last_serial = end_of(&segments);
        let writer = ThreadPool::new(&format!("{name}-writer"), 1)?;
        let core = Arc::new(DomainCore {
            name: name.to_string(),
            dir,
            config: RwLock::new(config),
            header_context,
            current: Mutex::new(CurrentChunk {
                chunk: Chunk::new(),
                last_serial,
            }),
            segments: RwLock::new(segments),
            sessions: Mutex::new(BTreeMap::new()),
            next_session_id: AtomicU32::new(1),
            sync_monitor: Arc::new(SyncMonitor::default()),
            erase_lock: Mutex::new(()),
            commit_pool,
            session_pool,
            max_session_run_time: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
        });

        info!(
            domain = name,
            segments = core.segments.read().len(),
            range = %core.range(),
            "opened domain"
        );
        Ok(Self { core, writer })
    }

    /// Commits a packet and returns a handle to wait for its resolution.
    ///
    /// # Errors
    ///
    /// See [`Domain::commit_with`].
    pub fn commit(&self, packet: Packet) -> TransLogResult<CommitHandle> {
        let (tx, rx) = mpsc::channel();
        self.commit_with(
            packet,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )?;
        Ok(CommitHandle { rx })
    }

    /// Commits a packet; `on_done` runs once it is written.
    ///
    /// The packet must start after the last committed serial.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPacket` for an empty packet, `ProtocolViolation` if
    /// the packet does not advance the log, `DomainFailed` once the domain
    /// hit a write failure, and `Rejected` if a full chunk cannot be handed
    /// to the writer. On error `on_done` is not called and nothing changes.
    pub fn commit_with(&self, packet: Packet, on_done: DoneCallback) -> TransLogResult<()> {
        self.core.check_healthy()?;
        if packet.is_empty() {
            return Err(TransLogError::invalid_packet("cannot commit an empty packet"));
        }

        let mut current = self.core.current.lock();
        let range = packet.range();
        if range.from() < current.last_serial {
            return Err(TransLogError::ProtocolViolation {
                from: range.from(),
                last: current.last_serial,
            });
        }
        current.chunk.add(packet, on_done)?;
        current.last_serial = range.to();

        if current.chunk.size_bytes() > self.core.config.read().chunk_size_limit {
            self.dispatch(&mut current)?;
        }
        Ok(())
    }

    /// Hands the active chunk to the writer if it is older than the age
    /// limit. Returns whether a chunk was dispatched.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the writer no longer accepts work.
    pub fn commit_if_stale(&self) -> TransLogResult<bool> {
        let mut current = self.core.current.lock();
        let limit = self.core.config.read().chunk_age_limit;
        if current.chunk.is_empty() || current.chunk.age() <= limit {
            return Ok(false);
        }
        self.dispatch(&mut current)
    }

    /// Hands the active chunk to the writer regardless of its size and age.
    /// Returns whether a chunk was dispatched.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the writer no longer accepts work.
    pub fn flush(&self) -> TransLogResult<bool> {
        let mut current = self.core.current.lock();
        self.dispatch(&mut current)
    }

    /// Swaps out the active chunk and queues it on the writer.
    ///
    /// Runs under the chunk lock so chunks reach the writer in commit order.
    fn dispatch(&self, current: &mut MutexGuard<'_, CurrentChunk>) -> TransLogResult<bool> {
        if current.chunk.is_empty() {
            return Ok(false);
        }
        let chunk = std::mem::take(&mut current.chunk);
        let core = Arc::clone(&self.core);
        self.writer.execute(Box::new(move || core.write_chunk(chunk)))?;
        Ok(true)
    }

    /// Queues a sync of the open segment on the commit pool.
    ///
    /// Calls made while a sync is pending coalesce with it.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` if the commit pool no longer accepts work.
    pub fn trigger_sync_now(&self) -> TransLogResult<()> {
        self.core.trigger_sync_now()
    }

    /// Blocks until no triggered sync is pending.
    pub fn wait_for_sync(&self) {
        self.core.sync_monitor.wait();
    }

    /// Prunes every serial up to and including `to`.
    ///
    /// Segments ending before `to` are deleted, but the last segment is
    /// always kept. The first remaining segment is trimmed to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment file or the directory cannot be
    /// updated.
    pub fn erase(&self, to: SerialNum) -> TransLogResult<()> {
        self.core.erase(to)
    }

    /// Registers a visit of `(from, to]` and returns its session id.
    ///
    /// Use `SerialNum::MAX` as `to` to follow the tail. The session does
    /// not run until [`Domain::start_session`].
    pub fn visit(&self, from: SerialNum, to: SerialNum, destination: Box<dyn Destination>) -> SessionId {
        self.core.clean_sessions();
        let id = self.core.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(
            id,
            SerialNumRange::new(from, to),
            Arc::downgrade(&self.core),
            destination,
        ));
        self.core.sessions.lock().insert(id, session);
        debug!(domain = %self.core.name, session = id, from, to, "registered visit");
        id
    }

    /// Starts a registered session on the session pool.
    ///
    /// Returns `false` if the id is unknown, the session was already
    /// started, or the pool rejected it; a rejected session is removed.
    pub fn start_session(&self, id: SessionId) -> bool {
        let mut sessions = self.core.sessions.lock();
        let Some(session) = sessions.get(&id).cloned() else {
            return false;
        };
        if !session.mark_started() {
            return false;
        }
        if let Err(rejected) = self.core.session_pool.execute(session_task(Arc::clone(&session))) {
            warn!(domain = %self.core.name, session = id, error = %rejected, "could not start session");
            session.abandon();
            sessions.remove(&id);
            return false;
        }
        true
    }

    /// Stops a session, waits until it is quiescent and removes it.
    ///
    /// Returns `false` if the id is unknown.
    pub fn close_session(&self, id: SessionId) -> bool {
        self.core.commit_pool.sync();
        let Some(session) = self.core.sessions.lock().get(&id).cloned() else {
            return false;
        };
        session.request_stop();
        session.wait_until_quiescent();
        self.core.sessions.lock().remove(&id);

        let run_time = session.run_time();
        let mut max = self.core.max_session_run_time.lock();
        if run_time > *max {
            *max = run_time;
        }
        debug!(domain = %self.core.name, session = id, run_time_us = run_time.as_micros() as u64, "closed session");
        true
    }

    /// Returns the session with `id`, if registered.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.core.sessions.lock().get(&id).cloned()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.core.sessions.lock().len()
    }

    /// Returns the segment holding `serial`, if any.
    #[must_use]
    pub fn find_segment(&self, serial: SerialNum) -> Option<Arc<Segment>> {
        self.core
            .segments
            .read()
            .range(..=serial)
            .next_back()
            .filter(|(_, segment)| segment.range().contains(serial))
            .map(|(_, segment)| Arc::clone(segment))
    }

    /// Returns a snapshot of the domain and its segments.
    #[must_use]
    pub fn domain_info(&self) -> DomainInfo {
        let segments = self.core.segments.read();
        DomainInfo {
            range: range_of(&segments),
            size: segments.values().map(|s| s.size()).sum(),
            byte_size: segments.values().map(|s| s.byte_size()).sum(),
            max_session_run_time: *self.core.max_session_run_time.lock(),
            segments: segments
                .values()
                .map(|s| SegmentInfo {
                    range: s.range(),
                    size: s.size(),
                    byte_size: s.byte_size(),
                    file_name: s.file_name().to_string(),
                })
                .collect(),
        }
    }

    /// Returns the exclusive lower bound of the retained serials.
    #[must_use]
    pub fn begin(&self) -> SerialNum {
        self.core.begin()
    }

    /// Returns the last written serial.
    #[must_use]
    pub fn end(&self) -> SerialNum {
        end_of(&self.core.segments.read())
    }

    /// Returns the number of written entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.core.segments.read().values().map(|s| s.size()).sum()
    }

    /// Returns the bytes used by all segment files.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.core.segments.read().values().map(|s| s.byte_size()).sum()
    }

    /// Returns the last serial known to be durable.
    ///
    /// While the open segment has not been synced yet, the mark of the
    /// segment before it is reported.
    #[must_use]
    pub fn synced(&self) -> SerialNum {
        let segments = self.core.segments.read();
        let mut tail = segments.values().rev();
        let synced = tail.next().map_or(0, |s| s.synced());
        if synced == 0 {
            return tail.next().map_or(0, |s| s.synced());
        }
        synced
    }

    /// Returns the lowest `from` of the sessions not yet in sync, or
    /// `SerialNum::MAX` if there are none.
    #[must_use]
    pub fn find_oldest_active_visit(&self) -> SerialNum {
        self.core
            .sessions
            .lock()
            .values()
            .filter(|session| !session.in_sync())
            .map(|session| session.range().from())
            .min()
            .unwrap_or(SerialNum::MAX)
    }

    /// Replaces the configuration; applies to later commits and rotations.
    pub fn set_config(&self, config: DomainConfig) {
        *self.core.config.write() = config;
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> DomainConfig {
        self.core.config.read().clone()
    }

    /// Returns the domain name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns the domain directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.core.dir.path()
    }

    /// Returns the first write failure, if the domain has failed.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.core.failure.lock().clone()
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        {
            let mut current = self.core.current.lock();
            if let Err(e) = self.dispatch(&mut current) {
                warn!(domain = %self.core.name, error = %e, "dropping pending chunk");
            }
        }
        self.writer.shutdown();
        self.core.sync_monitor.wait();

        let sessions: Vec<_> = self.core.sessions.lock().values().cloned().collect();
        for session in &sessions {
            session.request_stop();
        }
        for session in &sessions {
            session.wait_until_quiescent();
        }
        info!(domain = %self.core.name, end = self.end(), "closed domain");
    }
}

fn end_of(segments: &BTreeMap<SerialNum, Arc<Segment>>) -> SerialNum {
    segments.values().next_back().map_or(0, |s| s.range().to())
}

fn range_of(segments: &BTreeMap<SerialNum, Arc<Segment>>) -> SerialNumRange {
    let begin = segments.values().next().map_or(0, |s| s.range().from());
    SerialNumRange::new(begin, end_of(segments))
}

impl DomainCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn begin(&self) -> SerialNum {
        range_of(&self.segments.read()).from()
    }

    fn range(&self) -> SerialNumRange {
        range_of(&self.segments.read())
    }

    /// Segments that may hold serials of `range`, in serial order.
    pub(crate) fn segments_overlapping(&self, range: SerialNumRange) -> Vec<Arc<Segment>> {
        self.segments
            .read()
            .values()
            .filter(|segment| {
                let held = segment.range();
                held.to() > range.from() && segment.start() <= range.to()
            })
            .cloned()
            .collect()
    }

    fn tail(&self) -> Option<Arc<Segment>> {
        self.segments.read().values().next_back().cloned()
    }

    fn check_healthy(&self) -> TransLogResult<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(TransLogError::domain_failed(&self.name, message.clone())),
            None => Ok(()),
        }
    }

    fn fail(&self, error: &TransLogError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            error!(domain = %self.name, error = %error, "domain failed, rejecting further commits");
            *failure = Some(error.to_string());
        }
    }

    /// Appends one chunk; runs on the writer thread only.
    fn write_chunk(self: &Arc<Self>, chunk: Chunk) {
        let age = chunk.age();
        let (packet, callbacks) = chunk.into_parts();

        let result = self.check_healthy().and_then(|()| self.write_packet(&packet));
        if let Err(e) = &result {
            self.fail(e);
        }
        self.clean_sessions();

        debug!(
            domain = %self.name,
            acks = callbacks.len(),
            entries = packet.len(),
            bytes = packet.size_bytes(),
            age_us = age.as_micros() as u64,
            "released chunk"
        );
        for callback in callbacks {
            callback(match &result {
                Ok(()) => Ok(()),
                Err(_) => self.check_healthy(),
            });
        }
    }

    fn write_packet(self: &Arc<Self>, packet: &Packet) -> TransLogResult<()> {
        let Some(first) = packet.first_serial() else {
            return Ok(());
        };
        let Some(mut segment) = self.tail() else {
            return Err(TransLogError::domain_failed(&self.name, "no open segment"));
        };
        let config = self.config.read().clone();

        if segment.size() > 0 && segment.byte_size() > config.segment_size_limit {
            self.sync_monitor.wait();
            self.trigger_sync_now()?;
            self.sync_monitor.wait();
            self.check_healthy()?;
            segment.close()?;

            let fresh = Arc::new(Segment::open(
                &self.name,
                self.dir.path(),
                first,
                config.encoding,
                config.compression_level,
                self.header_context.as_ref(),
                SegmentMode::Append,
            )?);
            self.segments.write().insert(first, Arc::clone(&fresh));
            self.dir.sync()?;
            info!(
                domain = %self.name,
                closed = segment.file_name(),
                closed_range = %segment.range(),
                opened = fresh.file_name(),
                "rotated segment"
            );
            segment = fresh;
        }

        segment.commit(packet)?;
        if config.fsync_on_commit {
            segment.sync()?;
        }
        Ok(())
    }

    fn trigger_sync_now(self: &Arc<Self>) -> TransLogResult<()> {
        let mut pending = self.sync_monitor.pending.lock();
        if *pending {
            return Ok(());
        }
        let Some(segment) = self.tail() else {
            return Ok(());
        };
        *pending = true;

        let monitor = Arc::clone(&self.sync_monitor);
        let core = Arc::downgrade(self);
        let task: Task = Box::new(move || {
            if let Err(e) = segment.sync() {
                if let Some(core) = core.upgrade() {
                    core.fail(&e);
                }
            }
            monitor.finish();
        });
        if let Err(rejected) = self.commit_pool.execute(task) {
            *pending = false;
            self.sync_monitor.done.notify_all();
            return Err(rejected.into());
        }
        Ok(())
    }

    fn erase(&self, to: SerialNum) -> TransLogResult<()> {
        let _guard = self.erase_lock.lock();
        loop {
            let victim = {
                let segments = self.segments.read();
                match segments.first_key_value() {
                    Some((&start, segment)) if segments.len() > 1 && segment.range().to() < to => {
                        (start, Arc::clone(segment))
                    }
                    _ => break,
                }
            };
            let (start, segment) = victim;
            self.segments.write().remove(&start);
            segment.erase(to)?;
            self.dir.sync()?;
            info!(
                domain = %self.name,
                segment = segment.file_name(),
                to,
                "erased segment"
            );
        }

        let first = self.segments.read().values().next().cloned();
        if let Some(first) = first {
            if first.range().to() >= to {
                first.erase(to)?;
            }
        }
        Ok(())
    }

    fn clean_sessions(&self) {
        let mut sessions = self.sessions.lock();
        if sessions.is_empty() {
            return;
        }
        sessions.retain(|_, session| !session.in_sync() && !session.finished());
    }
}
