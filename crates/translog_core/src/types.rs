//! Serial number types.

use std::fmt;

/// Identifier of one logged record.
///
/// Serial numbers are strictly increasing across a domain. Gaps are
/// permitted, both from producers and from pruning.
pub type SerialNum = u64;

/// A range of serial numbers: `from` exclusive, `to` inclusive.
///
/// `from` is the serial immediately preceding the first record of the
/// range, so `SerialNumRange::new(0, 2)` covers serials 1 and 2. The same
/// convention is used for packets, segments, domains and visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SerialNumRange {
    from: SerialNum,
    to: SerialNum,
}

impl SerialNumRange {
    /// Creates a new range covering `(from, to]`.
    #[must_use]
    pub const fn new(from: SerialNum, to: SerialNum) -> Self {
        Self { from, to }
    }

    /// Creates an open-ended range that follows the tail of the log.
    #[must_use]
    pub const fn tail(from: SerialNum) -> Self {
        Self {
            from,
            to: SerialNum::MAX,
        }
    }

    /// Returns the exclusive lower bound.
    #[must_use]
    pub const fn from(&self) -> SerialNum {
        self.from
    }

    /// Returns the inclusive upper bound.
    #[must_use]
    pub const fn to(&self) -> SerialNum {
        self.to
    }

    /// Moves the exclusive lower bound.
    pub fn set_from(&mut self, from: SerialNum) {
        self.from = from;
    }

    /// Moves the inclusive upper bound.
    pub fn set_to(&mut self, to: SerialNum) {
        self.to = to;
    }

    /// Returns `true` if `serial` lies inside the range.
    #[must_use]
    pub const fn contains(&self, serial: SerialNum) -> bool {
        self.from < serial && serial <= self.to
    }

    /// Returns `true` if no serial can lie inside the range.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Returns `true` if the range has no upper bound.
    #[must_use]
    pub const fn follows_tail(&self) -> bool {
        self.to == SerialNum::MAX
    }

    /// Returns `true` if the two ranges share at least one serial.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.from < other.to
            && other.from < self.to
    }
}

impl fmt::Display for SerialNumRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.follows_tail() {
            write!(f, "({}, tail]", self.from)
        } else {
            write!(f, "({}, {}]", self.from, self.to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_bound_is_exclusive() {
        let range = SerialNumRange::new(0, 2);
        assert!(!range.contains(0));
        assert!(range.contains(1));
        assert!(range.contains(2));
        assert!(!range.contains(3));
    }

    #[test]
    fn empty_ranges() {
        assert!(SerialNumRange::new(5, 5).is_empty());
        assert!(SerialNumRange::new(6, 5).is_empty());
        assert!(!SerialNumRange::new(4, 5).is_empty());
        assert!(SerialNumRange::default().is_empty());
    }

    #[test]
    fn overlap_respects_exclusive_bound() {
        let a = SerialNumRange::new(0, 1);
        let b = SerialNumRange::new(1, 5);
        assert!(!a.overlaps(&b));
        assert!(SerialNumRange::new(0, 2).overlaps(&b));
        assert!(SerialNumRange::tail(3).overlaps(&b));
        assert!(!SerialNumRange::new(3, 3).overlaps(&b));
    }

    #[test]
    fn display() {
        assert_eq!(SerialNumRange::new(3, 9).to_string(), "(3, 9]");
        assert_eq!(SerialNumRange::tail(7).to_string(), "(7, tail]");
    }
}
