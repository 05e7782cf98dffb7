//! Property-based test generators using proptest.
//!
//! Provides strategies for generating packets whose serials keep the
//! ordering a domain requires.

use proptest::prelude::*;
use translog_core::{Entry, Packet, SerialNum};

/// Strategy for generating entry payloads (arbitrary bytes).
pub fn entry_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating record types.
pub fn entry_kind_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), 1u32..16, any::<u32>()]
}

/// Strategy for generating strictly ascending serials, starting above
/// zero with gaps of up to `max_gap`.
pub fn ascending_serials_strategy(
    min_len: usize,
    max_len: usize,
    max_gap: SerialNum,
) -> impl Strategy<Value = Vec<SerialNum>> {
    prop::collection::vec(1..=max_gap.max(1), min_len..max_len).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0, |serial, gap| {
                *serial += gap;
                Some(*serial)
            })
            .collect()
    })
}

/// Strategy for generating a single packet with ascending serials.
pub fn packet_strategy() -> impl Strategy<Value = Packet> {
    ascending_serials_strategy(1, 32, 4)
        .prop_flat_map(|serials| {
            let len = serials.len();
            (
                Just(serials),
                prop::collection::vec((entry_kind_strategy(), entry_data_strategy()), len),
            )
        })
        .prop_map(|(serials, payloads)| {
            let entries = serials
                .into_iter()
                .zip(payloads)
                .map(|(serial, (kind, data))| Entry::new(serial, kind, data));
            Packet::from_entries(entries).expect("Serials ascend")
        })
}

/// Strategy for generating a commit sequence: consecutive packets whose
/// serials ascend across packet boundaries.
pub fn commit_sequence_strategy(
    max_packets: usize,
    max_entries: usize,
) -> impl Strategy<Value = Vec<Vec<SerialNum>>> {
    prop::collection::vec(1..=max_entries.max(1), 1..=max_packets.max(1)).prop_flat_map(
        |lengths| {
            let total: usize = lengths.iter().sum();
            ascending_serials_strategy(total, total + 1, 3).prop_map(move |serials| {
                let mut batches = Vec::with_capacity(lengths.len());
                let mut rest = serials.as_slice();
                for &len in &lengths {
                    let (batch, tail) = rest.split_at(len);
                    batches.push(batch.to_vec());
                    rest = tail;
                }
                batches
            })
        },
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for tests that touch the filesystem.
    #[must_use]
    pub fn io_bound() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 50,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn serials_strictly_ascend(serials in ascending_serials_strategy(1, 64, 5)) {
            prop_assert!(serials[0] >= 1);
            prop_assert!(serials.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn packet_range_covers_entries(packet in packet_strategy()) {
            let first = packet.entries()[0].serial;
            let last = packet.entries()[packet.len() - 1].serial;
            prop_assert_eq!(packet.range().from(), first - 1);
            prop_assert_eq!(packet.range().to(), last);
        }

        #[test]
        fn commit_sequence_ascends_across_packets(batches in commit_sequence_strategy(8, 6)) {
            let flat: Vec<_> = batches.iter().flatten().copied().collect();
            prop_assert!(batches.iter().all(|b| !b.is_empty()));
            prop_assert!(flat.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
