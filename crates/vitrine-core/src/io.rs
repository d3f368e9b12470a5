//! Time and randomness seams
//!
//! TigerStyle: All non-deterministic inputs go through traits.
//!
//! The session layer touches non-determinism in exactly two places: flush
//! timer deadlines and message ids. Both come through `IoContext`, so the
//! same actor code runs against the wall clock in production and against a
//! manually advanced clock with a fixed seed in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Time Provider
// ============================================================================

/// Clock seam for the session layer
///
/// Session and pipeline code MUST take time from here, never from
/// `SystemTime::now()` or `tokio::time::sleep` directly, or flush deadlines
/// stop being controllable from tests.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;

    /// Wait until `ms` milliseconds of provider time have passed
    async fn sleep_ms(&self, ms: u64);
}

/// Wall-clock provider for production
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

// ============================================================================
// RNG Provider
// ============================================================================

/// Randomness seam
///
/// Message ids come from here, so a seeded provider makes a whole transcript
/// reproducible.
pub trait RngProvider: Send + Sync + std::fmt::Debug {
    /// Next random u64
    fn next_u64(&self) -> u64;

    /// Next random f64 in [0, 1)
    fn next_f64(&self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Format two random words as a UUID v4 string
    fn gen_uuid(&self) -> String {
        let high = self.next_u64();
        let low = self.next_u64();

        let bytes = [
            ((high >> 56) & 0xff) as u8,
            ((high >> 48) & 0xff) as u8,
            ((high >> 40) & 0xff) as u8,
            ((high >> 32) & 0xff) as u8,
            ((high >> 24) & 0xff) as u8,
            ((high >> 16) & 0xff) as u8,
            (((high >> 8) & 0x0f) | 0x40) as u8, // Version 4
            (high & 0xff) as u8,
            (((low >> 56) & 0x3f) | 0x80) as u8, // Variant 1
            ((low >> 48) & 0xff) as u8,
            ((low >> 40) & 0xff) as u8,
            ((low >> 32) & 0xff) as u8,
            ((low >> 24) & 0xff) as u8,
            ((low >> 16) & 0xff) as u8,
            ((low >> 8) & 0xff) as u8,
            (low & 0xff) as u8,
        ];

        format!(
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3],
            bytes[4], bytes[5],
            bytes[6], bytes[7],
            bytes[8], bytes[9],
            bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
        )
    }
}

/// Lock-free xorshift64* RNG over an atomic state
///
/// Not cryptographically secure; it only has to make message ids unique.
#[derive(Debug)]
pub struct StdRngProvider {
    state: AtomicU64,
}

impl Default for StdRngProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StdRngProvider {
    /// Seed from the system clock
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            | 1; // xorshift state must be non-zero

        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Seed explicitly, for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed | 1),
        }
    }
}

impl RngProvider for StdRngProvider {
    fn next_u64(&self) -> u64 {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            let mut x = state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;

            match self
                .state
                .compare_exchange_weak(state, x, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return x.wrapping_mul(0x2545F4914F6CDD1D),
                Err(s) => state = s,
            }
        }
    }
}

// ============================================================================
// I/O Context
// ============================================================================

/// The bundle of providers handed to the session layer
#[derive(Clone)]
pub struct IoContext {
    pub time: Arc<dyn TimeProvider>,
    pub rng: Arc<dyn RngProvider>,
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("time", &self.time)
            .field("rng", &self.rng)
            .finish()
    }
}

impl Default for IoContext {
    fn default() -> Self {
        Self::production()
    }
}

impl IoContext {
    /// Wall clock plus a clock-seeded RNG
    pub fn production() -> Self {
        Self {
            time: Arc::new(WallClockTime::new()),
            rng: Arc::new(StdRngProvider::new()),
        }
    }

    pub fn new(time: Arc<dyn TimeProvider>, rng: Arc<dyn RngProvider>) -> Self {
        Self { time, rng }
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    pub async fn sleep_ms(&self, ms: u64) {
        self.time.sleep_ms(ms).await;
    }

    pub fn gen_uuid(&self) -> String {
        self.rng.gen_uuid()
    }
}
