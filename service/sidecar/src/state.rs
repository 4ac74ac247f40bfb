use tokio::sync::Mutex;
use tokio::time::Instant;

/// The sidecar's entire mutable lifecycle, guarded by a single lock as
/// the spec requires: `lastReqTS`, `lastPingTS`, `activating`, `terminate`.
///
/// A single lock (rather than one per field) is deliberate — every
/// transition here is a single, small critical section and there is no
/// scenario where holding the lock across two of these fields at once
/// would block for any meaningful time.
pub struct SidecarState {
    inner: Mutex<Inner>,
}

struct Inner {
    last_req: Instant,
    last_ping: Instant,
    activating: bool,
    terminate: bool,
}

impl SidecarState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                last_req: now,
                last_ping: now,
                activating: false,
                terminate: false,
            }),
        }
    }

    pub async fn activating(&self) -> bool {
        self.inner.lock().await.activating
    }

    pub async fn set_activating(&self, value: bool) {
        self.inner.lock().await.activating = value;
    }

    pub async fn terminate(&self) -> bool {
        self.inner.lock().await.terminate
    }

    pub async fn set_terminate(&self, value: bool) {
        self.inner.lock().await.terminate = value;
    }

    /// Resets both timestamps to now. Called once `Activate` has fully
    /// succeeded, so a freshly specialized pod isn't immediately seen as
    /// having an ancient last request.
    pub async fn reset_timestamps(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.last_req = now;
        inner.last_ping = now;
    }

    pub async fn touch_last_req(&self) {
        self.inner.lock().await.last_req = Instant::now();
    }

    pub async fn touch_last_ping(&self) {
        self.inner.lock().await.last_ping = Instant::now();
    }

    /// Returns `(last_req_s, last_ping_s)` measured against `now`.
    pub async fn elapsed(&self, now: Instant) -> (f64, f64) {
        let inner = self.inner.lock().await;
        (
            now.saturating_duration_since(inner.last_req).as_secs_f64(),
            now.saturating_duration_since(inner.last_ping).as_secs_f64(),
        )
    }
}

impl Default for SidecarState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn starts_neither_activating_nor_terminating() {
        let state = SidecarState::new();
        assert!(!state.activating().await);
        assert!(!state.terminate().await);
    }

    #[tokio::test]
    async fn reset_timestamps_zeroes_elapsed_durations() {
        let state = SidecarState::new();
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.reset_timestamps().await;
        let (last_req_s, last_ping_s) = state.elapsed(Instant::now()).await;
        assert!(last_req_s < 0.02);
        assert!(last_ping_s < 0.02);
    }

    #[tokio::test]
    async fn touch_last_req_moves_only_that_timestamp() {
        let state = SidecarState::new();
        state.reset_timestamps().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.touch_last_req().await;
        let now = Instant::now();
        let (last_req_s, last_ping_s) = state.elapsed(now).await;
        assert!(last_req_s < last_ping_s);
    }

    #[tokio::test]
    async fn set_terminate_is_observed() {
        let state = SidecarState::new();
        state.set_terminate(true).await;
        assert!(state.terminate().await);
    }
}
