//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples engine logic from system resources
//! (time and randomness). Production code runs on [`SystemEnv`]; tests
//! substitute a virtual clock so time-dependent policies - signed-field
//! timestamps and the poll loop's elapsed-time failure classification -
//! can be exercised without waiting.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards
//! - RNG quality: `random_bytes()` uses cryptographically secure entropy
//!   in production (IVs and group keys come from it)

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time.
    fn now(&self) -> Instant;

    /// Returns wall-clock milliseconds since the Unix epoch.
    ///
    /// Used only as advisory freshness metadata in signed fields; the
    /// engine never compares it against `now()`.
    fn unix_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use OS entropy; the bytes end up
    /// as AES keys and initialization vectors.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a fixed-size array of random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Production environment using system time and cryptographic RNG.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // NOTE: This should never fail on supported platforms. Fill
            // with zeros rather than panic; callers treat the output as
            // security-critical, so log loudly.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
