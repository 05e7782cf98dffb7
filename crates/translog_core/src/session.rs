//! Visiting sessions that stream a serial range to a destination.
//!
//! ```text
//! Created ──start──▶ Running ──range done──▶ Finished
//!                       │
//!                       └──tail reached────▶ InSync
//! ```
//!
//! A session whose upper bound is [`SerialNum::MAX`] follows the tail: once
//! it has delivered everything the domain holds it becomes `InSync`. Any
//! other session delivers its range, reports `send_done` and becomes
//! `Finished`. A failed send or a stop request also ends in `Finished`.

use crate::domain::DomainCore;
use crate::error::TransLogResult;
use crate::packet::Packet;
use crate::types::{SerialNum, SerialNumRange};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Identifier of a session, unique within its domain.
pub type SessionId = u32;

/// Receives the packets of a visit.
pub trait Destination: Send + Sync {
    /// Delivers one packet. Returning `false` ends the session.
    fn send(&self, id: SessionId, domain: &str, packet: &Packet) -> bool;

    /// Reports that a bounded visit delivered its whole range.
    fn send_done(&self, id: SessionId, domain: &str) -> bool;

    /// Returns `false` once the receiver has gone away.
    fn connected(&self) -> bool {
        true
    }

    /// Returns `false` after a delivery error.
    fn ok(&self) -> bool {
        true
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered but not started.
    Created,
    /// Streaming on the session pool.
    Running,
    /// A tail-following visit that caught up with the log.
    InSync,
    /// The visit completed, failed or was stopped.
    Finished,
}

#[derive(Debug)]
struct Progress {
    state: SessionState,
    range: SerialNumRange,
    running: bool,
    started: Option<Instant>,
    run_time: Duration,
}

/// A stateful visitor over a serial range.
pub struct Session {
    id: SessionId,
    domain: Weak<DomainCore>,
    destination: Box<dyn Destination>,
    progress: Mutex<Progress>,
    quiescent: Condvar,
    stop: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let progress = self.progress.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &progress.state)
            .field("range", &progress.range)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        range: SerialNumRange,
        domain: Weak<DomainCore>,
        destination: Box<dyn Destination>,
    ) -> Self {
        Self {
            id,
            domain,
            destination,
            progress: Mutex::new(Progress {
                state: SessionState::Created,
                range,
                running: false,
                started: None,
                run_time: Duration::ZERO,
            }),
            quiescent: Condvar::new(),
            stop: AtomicBool::new(false),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the range still to be delivered.
    ///
    /// The lower bound advances as packets are delivered and when the
    /// domain has pruned the serials it pointed at.
    #[must_use]
    pub fn range(&self) -> SerialNumRange {
        self.progress.lock().range
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.progress.lock().state
    }

    /// Returns `true` once a tail-following session caught up.
    #[must_use]
    pub fn in_sync(&self) -> bool {
        self.state() == SessionState::InSync
    }

    /// Returns `true` once the session ended.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.state() == SessionState::Finished
    }

    /// Returns `true` while a visit task is scheduled or running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.progress.lock().running
    }

    /// Returns `true` if the session follows the tail of the log.
    #[must_use]
    pub fn follows_tail(&self) -> bool {
        self.range().follows_tail()
    }

    /// Time spent since the session was started, or its total once done.
    #[must_use]
    pub fn run_time(&self) -> Duration {
        let progress = self.progress.lock();
        match (progress.running, progress.started) {
            (true, Some(started)) => started.elapsed(),
            _ => progress.run_time,
        }
    }

    /// Moves a created session to `Running`; `false` if already started.
    pub(crate) fn mark_started(&self) -> bool {
        let mut progress = self.progress.lock();
        if progress.state != SessionState::Created {
            return false;
        }
        progress.state = SessionState::Running;
        progress.running = true;
        progress.started = Some(Instant::now());
        true
    }

    /// Undoes [`Session::mark_started`] after a failed dispatch.
    pub(crate) fn abandon(&self) {
        let mut progress = self.progress.lock();
        progress.state = SessionState::Finished;
        progress.running = false;
        self.quiescent.notify_all();
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Blocks until no visit task is running for this session.
    pub(crate) fn wait_until_quiescent(&self) {
        let mut progress = self.progress.lock();
        while progress.running {
            self.quiescent.wait(&mut progress);
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire) || !self.destination.connected() || !self.destination.ok()
    }

    fn advance(&self, to: SerialNum) {
        let mut progress = self.progress.lock();
        if to > progress.range.from() {
            progress.range.set_from(to);
        }
    }

    /// Body of the visit task on the session pool.
    pub(crate) fn run(&self) {
        let outcome = match self.domain.upgrade() {
            Some(domain) => {
                let result = self.stream(&domain);
                match result {
                    Ok(true) if self.follows_tail() => SessionState::InSync,
                    Ok(true) => {
                        if !self.destination.send_done(self.id, domain.name()) {
                            debug!(session = self.id, "destination rejected completion");
                        }
                        SessionState::Finished
                    }
                    Ok(false) => SessionState::Finished,
                    Err(e) => {
                        warn!(domain = domain.name(), session = self.id, error = %e, "visit failed");
                        SessionState::Finished
                    }
                }
            }
            None => SessionState::Finished,
        };

        let mut progress = self.progress.lock();
        progress.state = outcome;
        progress.running = false;
        if let Some(started) = progress.started {
            progress.run_time = started.elapsed();
        }
        debug!(
            session = self.id,
            state = ?outcome,
            run_time_us = progress.run_time.as_micros() as u64,
            "session done"
        );
        self.quiescent.notify_all();
    }

    /// Delivers packets until the range is exhausted.
    ///
    /// Returns `Ok(false)` if the destination or a stop request cut the
    /// visit short.
    fn stream(&self, domain: &DomainCore) -> TransLogResult<bool> {
        loop {
            if self.stopped() {
                return Ok(false);
            }
            let begin = domain.begin();
            let range = {
                let mut progress = self.progress.lock();
                if progress.range.from() < begin {
                    progress.range.set_from(begin);
                }
                progress.range
            };
            if range.is_empty() {
                return Ok(true);
            }

            let mut delivered = false;
            for segment in domain.segments_overlapping(range) {
                let completed = segment.visit(self.range(), |packet| {
                    if self.stopped() || !self.destination.send(self.id, domain.name(), &packet) {
                        return false;
                    }
                    self.advance(packet.range().to());
                    delivered = true;
                    true
                })?;
                if !completed {
                    return Ok(false);
                }
            }
            if !delivered {
                return Ok(true);
            }
        }
    }
}

/// Runs a session on the session pool.
pub(crate) fn session_task(session: Arc<Session>) -> crate::executor::Task {
    Box::new(move || session.run())
}
