//! Provider availability, probed at most once per status window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::provider::AiProvider;

/// Which provider a status flag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSlot {
    Local,
    Remote,
}

impl ProviderSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Snapshot of provider availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProviderStatus {
    pub local_available: bool,
    pub remote_available: bool,
    /// `None` until the first probe.
    pub last_checked: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    pub fn is_available(&self, slot: ProviderSlot) -> bool {
        match slot {
            ProviderSlot::Local => self.local_available,
            ProviderSlot::Remote => self.remote_available,
        }
    }

    pub fn any_available(&self) -> bool {
        self.local_available || self.remote_available
    }
}

struct StatusState {
    status: ProviderStatus,
    checked_at: Option<Instant>,
}

/// Availability cache owned by one coordinator.
pub struct ProviderStatusCache {
    local: Option<Arc<dyn AiProvider>>,
    remote: Option<Arc<dyn AiProvider>>,
    ttl: Duration,
    state: Mutex<StatusState>,
    probing: Mutex<()>,
}

impl ProviderStatusCache {
    pub fn new(
        local: Option<Arc<dyn AiProvider>>,
        remote: Option<Arc<dyn AiProvider>>,
        ttl: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            ttl,
            state: Mutex::new(StatusState {
                status: ProviderStatus::default(),
                checked_at: None,
            }),
            probing: Mutex::new(()),
        }
    }

    /// Current status, re-probing if the window has elapsed.
    pub async fn get(&self) -> ProviderStatus {
        self.refresh(false).await
    }

    /// Re-probe both providers when stale, or unconditionally when `force`.
    ///
    /// Probes run without the state lock held, so readers of a fresh status
    /// and `mark_unavailable` never wait on a slow provider. Probes themselves
    /// serialize on `probing`; a caller that waited re-checks freshness, so one
    /// stale window triggers one probe.
    pub async fn refresh(&self, force: bool) -> ProviderStatus {
        if !force && let Some(status) = self.fresh_status().await {
            return status;
        }

        let _probing = self.probing.lock().await;
        if !force && let Some(status) = self.fresh_status().await {
            return status;
        }

        let (local_available, remote_available) =
            futures::join!(probe(self.local.as_deref()), probe(self.remote.as_deref()));

        let mut state = self.state.lock().await;
        state.status = ProviderStatus {
            local_available,
            remote_available,
            last_checked: Some(Utc::now()),
        };
        state.checked_at = Some(Instant::now());
        info!(
            local = local_available,
            remote = remote_available,
            forced = force,
            "Provider status refreshed"
        );
        state.status
    }

    async fn fresh_status(&self) -> Option<ProviderStatus> {
        let state = self.state.lock().await;
        state
            .checked_at
            .is_some_and(|checked| checked.elapsed() < self.ttl)
            .then_some(state.status)
    }

    /// Mark a provider unavailable until the next refresh.
    pub async fn mark_unavailable(&self, slot: ProviderSlot) {
        let mut state = self.state.lock().await;
        match slot {
            ProviderSlot::Local => state.status.local_available = false,
            ProviderSlot::Remote => state.status.remote_available = false,
        }
        debug!(provider = slot.as_str(), "Provider marked unavailable");
    }
}

async fn probe(provider: Option<&dyn AiProvider>) -> bool {
    match provider {
        Some(provider) => provider.is_available().await,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ProviderError;
    use crate::task::{Difficulty, LanguageDetection, SummaryLength, VocabularyItem};

    struct Probe {
        available: AtomicBool,
        probes: AtomicUsize,
        delay: Duration,
    }

    impl Probe {
        fn new(available: bool) -> Arc<Self> {
            Self::slow(available, Duration::ZERO)
        }

        fn slow(available: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                available: AtomicBool::new(available),
                probes: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl AiProvider for Probe {
        fn name(&self) -> &str {
            "probe"
        }
        async fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.available.load(Ordering::SeqCst)
        }
        async fn detect_language(&self, _: &str) -> Result<LanguageDetection, ProviderError> {
            Err(ProviderError::processing("probe", "unused"))
        }
        async fn summarize(&self, _: &str, _: SummaryLength) -> Result<String, ProviderError> {
            Err(ProviderError::processing("probe", "unused"))
        }
        async fn rewrite(&self, _: &str, _: Difficulty) -> Result<String, ProviderError> {
            Err(ProviderError::processing("probe", "unused"))
        }
        async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, ProviderError> {
            Err(ProviderError::processing("probe", "unused"))
        }
        async fn analyze_vocabulary(
            &self,
            _: &[String],
            _: &str,
        ) -> Result<Vec<VocabularyItem>, ProviderError> {
            Err(ProviderError::processing("probe", "unused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probes_once_per_window() {
        let local = Probe::new(true);
        let cache = ProviderStatusCache::new(Some(local.clone()), None, Duration::from_secs(60));

        let status = cache.get().await;
        assert!(status.local_available);
        assert!(!status.remote_available);
        assert!(status.last_checked.is_some());

        cache.get().await;
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        cache.get().await;
        assert_eq!(local.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_reprobes() {
        let remote = Probe::new(false);
        let cache = ProviderStatusCache::new(None, Some(remote.clone()), Duration::from_secs(60));
        assert!(!cache.get().await.remote_available);

        remote.available.store(true, Ordering::SeqCst);
        assert!(!cache.get().await.remote_available);
        assert!(cache.refresh(true).await.remote_available);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_unavailable_lasts_until_window_ends() {
        let local = Probe::new(true);
        let cache = ProviderStatusCache::new(Some(local), None, Duration::from_secs(60));
        cache.get().await;

        cache.mark_unavailable(ProviderSlot::Local).await;
        assert!(!cache.get().await.local_available);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get().await.local_available);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_does_not_block_readers() {
        let local = Probe::slow(true, Duration::from_secs(10));
        let cache = Arc::new(ProviderStatusCache::new(
            Some(local.clone()),
            None,
            Duration::from_secs(60),
        ));
        assert!(cache.get().await.local_available);

        let refreshing = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh(true).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(local.probes.load(Ordering::SeqCst), 2);

        let quick = Duration::from_secs(1);
        tokio::time::timeout(quick, cache.mark_unavailable(ProviderSlot::Local))
            .await
            .expect("mark_unavailable waited on the probe");
        let status = tokio::time::timeout(quick, cache.get())
            .await
            .expect("get waited on the probe");
        assert!(!status.local_available);

        assert!(refreshing.await.unwrap().local_available);
        assert_eq!(local.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stale_readers_share_one_probe() {
        let local = Probe::slow(true, Duration::from_secs(5));
        let cache = ProviderStatusCache::new(Some(local.clone()), None, Duration::from_secs(60));

        let (a, b) = futures::join!(cache.get(), cache.get());
        assert!(a.local_available && b.local_available);
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);
    }
}
