//! Write pacing for the peer-to-peer channel.
//!
//! The datachannel transport exposes a buffered-amount counter and a
//! low-water callback. Writers consult [`FlowControl::throttle`] before
//! each write and park while the buffer sits above the threshold; the
//! transport's callback calls [`FlowControl::flushed`] to wake them.

use tokio::sync::Notify;

/// Threshold above which writers park. Large thresholds have been seen to
/// stall some SCTP stacks, so stay well under 1 MiB.
pub const DEFAULT_BUFFERED_THRESHOLD: u64 = 512 << 10;

pub struct FlowControl {
    threshold: u64,
    flushed: Notify,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFERED_THRESHOLD)
    }
}

impl FlowControl {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            flushed: Notify::new(),
        }
    }

    /// The low-water mark to configure on the transport.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Called from the transport's buffered-amount-low callback.
    pub fn flushed(&self) {
        self.flushed.notify_waiters();
    }

    /// Wait until the buffered amount reported by `buffered` is at or
    /// below the threshold.
    pub async fn throttle(&self, mut buffered: impl FnMut() -> u64) {
        loop {
            // Register before re-checking so a flush between the check and
            // the await is not lost.
            let flushed = self.flushed.notified();
            if buffered() <= self.threshold {
                return;
            }
            flushed.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn writes_pass_when_under_threshold() {
        let flow = FlowControl::new(1024);
        tokio::time::timeout(Duration::from_millis(100), flow.throttle(|| 512))
            .await
            .expect("must not block under the threshold");
    }

    #[tokio::test]
    async fn writes_park_until_the_transport_flushes() {
        let flow = Arc::new(FlowControl::new(1024));
        let buffered = Arc::new(AtomicU64::new(4096));

        let writer = {
            let flow = flow.clone();
            let buffered = buffered.clone();
            tokio::spawn(async move {
                flow.throttle(move || buffered.load(Ordering::Relaxed)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished(), "writer must park above the threshold");

        buffered.store(0, Ordering::Relaxed);
        flow.flushed();
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer must wake on flush")
            .unwrap();
    }
}
