use std::time::Duration;

use tokio::task::JoinHandle;

use crate::refresh::RefreshKey;

/// Coalesces filter keystrokes into one refresh per pause in typing
///
/// The caller writes the typed value into the filter tree right away; the
/// debouncer only decides when the refresh key is bumped.
#[derive(Debug)]
pub struct FilterDebouncer {
    delay: Duration,
    refresh: RefreshKey,
    pending: Option<JoinHandle<()>>,
}

impl FilterDebouncer {
    pub fn new(delay: Duration, refresh: RefreshKey) -> Self {
        Self {
            delay,
            refresh,
            pending: None,
        }
    }

    /// Cancels any scheduled refresh and schedules a new one. Must run inside a tokio runtime.
    pub fn keystroke(&mut self) {
        self.cancel();
        let refresh = self.refresh.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let key = refresh.bump();
            tracing::debug!(refresh_key = key, "debounced filter refresh");
        }));
    }

    /// Refreshes now if a refresh is still scheduled; returns whether it did
    pub fn blur(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                self.refresh.bump();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Drops a scheduled refresh without running it
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for FilterDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rapid_keystrokes_refresh_once() {
        let key = RefreshKey::new();
        let mut debouncer = FilterDebouncer::new(Duration::from_millis(500), key.clone());

        for _ in 0..5 {
            debouncer.keystroke();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(key.get(), 0);

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(key.get(), 1);
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(key.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_flushes_pending_refresh() {
        let key = RefreshKey::new();
        let mut debouncer = FilterDebouncer::new(Duration::from_millis(500), key.clone());

        debouncer.keystroke();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debouncer.blur());
        assert_eq!(key.get(), 1);

        // The aborted task never fires
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(key.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_after_refresh_fired_is_noop() {
        let key = RefreshKey::new();
        let mut debouncer = FilterDebouncer::new(Duration::from_millis(500), key.clone());

        debouncer.keystroke();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(key.get(), 1);
        assert!(!debouncer.blur());
        assert_eq!(key.get(), 1);

        assert!(!debouncer.blur());
    }
}
