//! Minimum-latency padding for security-sensitive calls
//!
//! Pads every return path up to a fixed floor so external timing cannot tell
//! an invalid namespace from a denied one from an allowed one. Paths that
//! already exceed the floor return as-is; nothing is ever shortened.

use std::time::Duration;
use tokio::time::Instant;

/// A minimum wall-clock duration for a call.
#[derive(Debug, Clone, Copy)]
pub struct TimingFloor {
    floor: Duration,
}

impl TimingFloor {
    pub fn new(floor: Duration) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Sleep until at least `floor` has passed since `started`.
    pub async fn pad(&self, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed < self.floor {
            tokio::time::sleep(self.floor - elapsed).await;
        }
    }

    /// Run `fut` and pad its completion to the floor.
    pub async fn run<T>(&self, fut: impl std::future::Future<Output = T>) -> T {
        let started = Instant::now();
        let out = fut.await;
        self.pad(started).await;
        out
    }
}
