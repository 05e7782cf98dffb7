//! The in-memory batch of commits waiting for the writer.

use crate::error::TransLogResult;
use crate::packet::Packet;
use std::time::{Duration, Instant};

/// Completion of one commit, called once its data is written and, when the
/// domain syncs on commit, durable.
pub type DoneCallback = Box<dyn FnOnce(TransLogResult<()>) + Send + 'static>;

/// Accumulates committed packets and their completions until flushed.
///
/// A chunk is swapped out of the domain in one step and consumed exactly
/// once by the writer through [`Chunk::into_parts`].
#[derive(Default)]
pub struct Chunk {
    packet: Packet,
    callbacks: Vec<DoneCallback>,
    first_arrival: Option<Instant>,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("range", &self.packet.range())
            .field("entries", &self.packet.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Chunk {
    /// Creates an empty chunk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `packet` and registers its completion.
    ///
    /// # Errors
    ///
    /// Returns an error if `packet` does not follow the packets already held;
    /// the chunk is left unchanged and `on_done` is not registered.
    pub fn add(&mut self, packet: Packet, on_done: DoneCallback) -> TransLogResult<()> {
        self.packet.merge(packet)?;
        if self.callbacks.is_empty() {
            self.first_arrival = Some(Instant::now());
        }
        self.callbacks.push(on_done);
        Ok(())
    }

    /// Time since the first commit arrived, zero while empty.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.first_arrival.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Encoded size of the merged packet.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.packet.size_bytes()
    }

    /// Returns `true` if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    /// The merged packet.
    #[must_use]
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Number of completions waiting on this chunk.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Splits the chunk into its packet and completions.
    #[must_use]
    pub fn into_parts(self) -> (Packet, Vec<DoneCallback>) {
        (self.packet, self.callbacks)
    }
}
