//! Destinations that record what a visit delivered.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use translog_core::{Destination, Packet, SerialNum, SessionId};

#[derive(Debug, Default)]
struct Recorded {
    serials: Mutex<Vec<SerialNum>>,
    packets: AtomicUsize,
    done: AtomicBool,
    disconnected: AtomicBool,
}

/// A [`Destination`] that records every delivered serial.
///
/// Clones share their record, so a test keeps one clone and hands another
/// to `Domain::visit`.
#[derive(Debug, Clone, Default)]
pub struct RecordingDestination {
    recorded: Arc<Recorded>,
    delay: Duration,
    fail_after: Option<usize>,
}

impl RecordingDestination {
    /// Creates a destination that accepts every packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before accepting each packet.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuses every packet after the first `packets`.
    #[must_use]
    pub fn fail_after(mut self, packets: usize) -> Self {
        self.fail_after = Some(packets);
        self
    }

    /// Boxes a clone for `Domain::visit`.
    pub fn boxed(&self) -> Box<dyn Destination> {
        Box::new(self.clone())
    }

    /// Reports the receiver as gone from now on.
    pub fn disconnect(&self) {
        self.recorded.disconnected.store(true, Ordering::SeqCst);
    }

    /// Returns the serials delivered so far, in delivery order.
    pub fn serials(&self) -> Vec<SerialNum> {
        self.recorded.serials.lock().clone()
    }

    /// Returns the number of accepted packets.
    pub fn packet_count(&self) -> usize {
        self.recorded.packets.load(Ordering::SeqCst)
    }

    /// Returns `true` once `send_done` was received.
    pub fn is_done(&self) -> bool {
        self.recorded.done.load(Ordering::SeqCst)
    }

    /// Polls until `send_done` arrives or `timeout` passes.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_done() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl Destination for RecordingDestination {
    fn send(&self, _id: SessionId, _domain: &str, packet: &Packet) -> bool {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(limit) = self.fail_after {
            if self.packet_count() >= limit {
                return false;
            }
        }
        self.recorded
            .serials
            .lock()
            .extend(packet.entries().iter().map(|e| e.serial));
        self.recorded.packets.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn send_done(&self, _id: SessionId, _domain: &str) -> bool {
        self.recorded.done.store(true, Ordering::SeqCst);
        true
    }

    fn connected(&self) -> bool {
        !self.recorded.disconnected.load(Ordering::SeqCst)
    }
}
