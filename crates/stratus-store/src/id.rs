//! 128-bit identifiers and the process-wide monotonic ID generator.
//!
//! Both byte containers and indices are addressed by 128-bit IDs. Object
//! IDs come from [`IdGenerator`], a monotonic counter seeded at process
//! start; index IDs are derived from textual names by the gateway core.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A 128-bit unsigned identifier, ordered by `(hi, lo)`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id128 {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl Id128 {
    /// The all-zero ID, used as "no object".
    pub const NIL: Id128 = Id128 { hi: 0, lo: 0 };

    /// Construct from raw words.
    #[must_use]
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    /// Whether this is the nil ID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    /// Big-endian byte representation; sorts the same way as `(hi, lo)`.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.hi.to_be_bytes());
        out[8..].copy_from_slice(&self.lo.to_be_bytes());
        out
    }

    /// Reconstruct from the big-endian byte representation.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..]);
        Self {
            hi: u64::from_be_bytes(hi),
            lo: u64::from_be_bytes(lo),
        }
    }
}

impl fmt::Display for Id128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}:0x{:x}", self.hi, self.lo)
    }
}

impl fmt::Debug for Id128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id128({self})")
    }
}

/// Monotonic object-ID generator.
///
/// The high word carries a per-process seed derived from the wall clock at
/// construction time; the low word is an atomic counter. IDs from a single
/// generator never repeat, and generators constructed at different times
/// do not collide.
#[derive(Debug)]
pub struct IdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl IdGenerator {
    /// Create a generator seeded from the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        // Nanosecond resolution keeps two processes started back-to-back
        // on distinct seeds.
        Self::with_seed(now.as_nanos() as u64)
    }

    /// Create a generator with an explicit seed (tests).
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(1),
        }
    }

    /// Reserve the next ID.
    #[must_use]
    pub fn next_id(&self) -> Id128 {
        Id128 {
            hi: self.seed,
            lo: self.counter.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
