//! Per-host pacing of page loads and downloads

use crate::throttle::cache::{CacheError, SharedCache};
use chrono::Utc;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Which throttle an action ran under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleContext {
    Request,
    Download,
}

impl fmt::Display for ThrottleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Throttle failures
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The throttled action itself failed
    #[error("{context} to {host} failed: {source}")]
    Action {
        context: ThrottleContext,
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The active-download flag never cleared
    #[error("download throttle for {host} exhausted after {attempts} attempts")]
    Exhausted { host: String, attempts: u32 },

    /// Reading or writing shared throttle state failed
    #[error("throttle state for {host} unavailable: {source}")]
    Cache {
        host: String,
        #[source]
        source: CacheError,
    },

    #[error("throttle wait for {host} cancelled")]
    Cancelled { host: String },
}

/// Pacing parameters shared by every host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Lower bound of the randomized wait between requests
    pub min_wait: Duration,

    /// Upper bound of the randomized wait between requests
    pub max_wait: Duration,

    /// Polls of the active-download flag before giving up
    pub download_recursion_threshold: u32,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            min_wait: Duration::from_secs(3),
            max_wait: Duration::from_secs(10),
            download_recursion_threshold: 2000,
        }
    }
}

impl ThrottleSettings {
    /// A uniformly random wait in `[min_wait, max_wait]`
    pub fn random_wait(&self) -> Duration {
        let min = self.min_wait.as_millis() as u64;
        let max = self.max_wait.as_millis() as u64;
        if max <= min {
            return self.min_wait;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Serializes and paces every network call made to one host
///
/// Page loads and downloads are gated by separate locks so that neither
/// blocks the other. Shared state is always written back, whether the
/// action succeeded, failed or was cancelled mid-flight.
pub struct RequestManager {
    host: String,
    settings: ThrottleSettings,
    cache: Arc<dyn SharedCache>,
    request_lock: Mutex<()>,
    download_lock: Mutex<()>,
}

impl RequestManager {
    pub fn new(host: impl Into<String>, settings: ThrottleSettings, cache: Arc<dyn SharedCache>) -> Self {
        Self {
            host: host.into(),
            settings,
            cache,
            request_lock: Mutex::new(()),
            download_lock: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Runs a page load once this host is free and has rested long enough
    ///
    /// # Arguments
    ///
    /// * `cancel` - Aborts the lock wait, the pacing sleep or the action
    /// * `action` - The request to run; it is not polled until its turn
    ///
    /// # Returns
    ///
    /// The action's value, or a `ThrottleError::Action` wrapping its error.
    /// "Now" is recorded as the host's last request time exactly once for
    /// every action that started, regardless of how it ended.
    pub async fn throttle_request<T, E, F>(
        &self,
        cancel: &CancellationToken,
        action: F,
    ) -> Result<T, ThrottleError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let _permit = self.acquire(&self.request_lock, cancel).await?;

        let last = self
            .cache
            .last_request_time(&self.host)
            .await
            .map_err(|e| self.cache_error(e))?;

        let wait = match last {
            Some(last) => {
                let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
                self.settings.random_wait().saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        };

        if !wait.is_zero() {
            tracing::debug!("Throttling request to {} for {:?}", self.host, wait);
            self.sleep(wait, cancel).await?;
        }

        let write_back = self.write_back(ThrottleContext::Request);
        let outcome = self.run(action, cancel).await;
        let recorded = self.cache.store_last_request(&self.host).await;
        write_back.disarm();

        let value = self.finish(outcome, ThrottleContext::Request)?;
        recorded.map_err(|e| self.cache_error(e))?;
        Ok(value)
    }

    /// Runs a download once no process is downloading from this host
    ///
    /// Polls the shared active-download flag with the same randomized
    /// backoff as requests, giving up after
    /// `download_recursion_threshold` polls. The flag is set while the
    /// action runs and reset afterwards on every exit path, including the
    /// caller dropping this future (a timeout, a losing `select!` branch).
    pub async fn throttle_download<T, E, F>(
        &self,
        cancel: &CancellationToken,
        action: F,
    ) -> Result<T, ThrottleError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let _permit = self.acquire(&self.download_lock, cancel).await?;

        let mut attempts = 0;
        while self
            .cache
            .is_active_download(&self.host)
            .await
            .map_err(|e| self.cache_error(e))?
        {
            attempts += 1;
            if attempts >= self.settings.download_recursion_threshold {
                tracing::warn!(
                    "Download slot for {} never freed after {} attempts",
                    self.host,
                    attempts
                );
                return Err(ThrottleError::Exhausted {
                    host: self.host.clone(),
                    attempts,
                });
            }
            self.sleep(self.settings.random_wait(), cancel).await?;
        }

        self.cache
            .set_active_download(&self.host, true)
            .await
            .map_err(|e| self.cache_error(e))?;

        let write_back = self.write_back(ThrottleContext::Download);
        let outcome = self.run(action, cancel).await;
        let released = self.cache.set_active_download(&self.host, false).await;
        write_back.disarm();

        let value = self.finish(outcome, ThrottleContext::Download)?;
        released.map_err(|e| self.cache_error(e))?;
        Ok(value)
    }

    async fn acquire<'a>(
        &self,
        lock: &'a Mutex<()>,
        cancel: &CancellationToken,
    ) -> Result<MutexGuard<'a, ()>, ThrottleError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled()),
            guard = lock.lock() => Ok(guard),
        }
    }

    async fn sleep(&self, wait: Duration, cancel: &CancellationToken) -> Result<(), ThrottleError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// `None` when the action was cancelled before it finished
    async fn run<T, E, F>(&self, action: F, cancel: &CancellationToken) -> Option<Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = action => Some(outcome),
        }
    }

    fn finish<T, E>(
        &self,
        outcome: Option<Result<T, E>>,
        context: ThrottleContext,
    ) -> Result<T, ThrottleError>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(ThrottleError::Action {
                context,
                host: self.host.clone(),
                source: e.into(),
            }),
            None => Err(self.cancelled()),
        }
    }

    fn write_back(&self, context: ThrottleContext) -> WriteBack {
        WriteBack {
            host: self.host.clone(),
            cache: self.cache.clone(),
            context,
            armed: true,
        }
    }

    fn cancelled(&self) -> ThrottleError {
        ThrottleError::Cancelled {
            host: self.host.clone(),
        }
    }

    fn cache_error(&self, source: CacheError) -> ThrottleError {
        ThrottleError::Cache {
            host: self.host.clone(),
            source,
        }
    }
}

/// Shared-state write-back for a throttled action that has started
///
/// Disarmed once the throttle wrote the state itself. If the throttle
/// future is dropped first, the write is spawned onto the runtime instead:
/// requests record their last-request time, downloads clear the
/// active-download flag.
struct WriteBack {
    host: String,
    cache: Arc<dyn SharedCache>,
    context: ThrottleContext,
    armed: bool,
}

impl WriteBack {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WriteBack {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                "No runtime to write back {} throttle state for {}",
                self.context,
                self.host
            );
            return;
        };

        let host = std::mem::take(&mut self.host);
        let cache = self.cache.clone();
        let context = self.context;
        tracing::debug!("Throttled {} to {} dropped, writing state back", context, host);

        runtime.spawn(async move {
            let written = match context {
                ThrottleContext::Request => cache.store_last_request(&host).await,
                ThrottleContext::Download => cache.set_active_download(&host, false).await,
            };
            if let Err(e) = written {
                tracing::warn!("Could not write back {} throttle state for {}: {}", context, host, e);
            }
        });
    }
}

impl fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManager")
            .field("host", &self.host)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::InMemorySharedCache;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Counts writes and can pin the active-download flag
    #[derive(Default)]
    struct CountingCache {
        inner: InMemorySharedCache,
        stores: AtomicUsize,
        download_resets: AtomicUsize,
        stuck_download: AtomicBool,
    }

    #[async_trait]
    impl SharedCache for CountingCache {
        async fn last_request_time(
            &self,
            host: &str,
        ) -> Result<Option<DateTime<Utc>>, CacheError> {
            self.inner.last_request_time(host).await
        }

        async fn store_last_request(&self, host: &str) -> Result<(), CacheError> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.store_last_request(host).await
        }

        async fn is_active_download(&self, host: &str) -> Result<bool, CacheError> {
            if self.stuck_download.load(Ordering::SeqCst) {
                return Ok(true);
            }
            self.inner.is_active_download(host).await
        }

        async fn set_active_download(&self, host: &str, active: bool) -> Result<(), CacheError> {
            if !active {
                self.download_resets.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.set_active_download(host, active).await
        }
    }

    fn fast_settings() -> ThrottleSettings {
        ThrottleSettings {
            min_wait: Duration::from_millis(100),
            max_wait: Duration::from_millis(300),
            download_recursion_threshold: 5,
        }
    }

    fn manager(cache: Arc<CountingCache>, settings: ThrottleSettings) -> Arc<RequestManager> {
        Arc::new(RequestManager::new("example.com", settings, cache))
    }

    #[test]
    fn test_random_wait_bounds() {
        let settings = ThrottleSettings::default();
        for _ in 0..200 {
            let wait = settings.random_wait();
            assert!(wait >= Duration::from_secs(3) && wait <= Duration::from_secs(10));
        }

        let fixed = ThrottleSettings {
            min_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(2),
            ..ThrottleSettings::default()
        };
        assert_eq!(fixed.random_wait(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_never_overlap() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache.clone(), fast_settings());
        let cancel = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let calls = (0..6).map(|i| {
            let manager = manager.clone();
            let cancel = cancel.clone();
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            tokio::spawn(async move {
                manager
                    .throttle_request(&cancel, async {
                        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        if i % 2 == 0 {
                            Ok(i)
                        } else {
                            Err(std::io::Error::other("boom"))
                        }
                    })
                    .await
            })
        });

        let results = futures::future::join_all(calls).await;
        let failures = results
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(|r| r.is_err())
            .count();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(failures, 3);
        assert_eq!(cache.stores.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_is_recorded_and_wrapped() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache.clone(), fast_settings());

        let result: Result<(), _> = manager
            .throttle_request(&CancellationToken::new(), async {
                Err(std::io::Error::other("connection reset"))
            })
            .await;

        match result {
            Err(ThrottleError::Action { context, host, .. }) => {
                assert_eq!(context, ThrottleContext::Request);
                assert_eq!(host, "example.com");
            }
            other => panic!("expected action error, got {:?}", other),
        }
        assert_eq!(cache.stores.load(Ordering::SeqCst), 1);
        assert!(cache
            .last_request_time("example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_waits() {
        let cache = Arc::new(CountingCache::default());
        let settings = ThrottleSettings {
            min_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(5),
            download_recursion_threshold: 10,
        };
        let manager = manager(cache, settings);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        manager
            .throttle_request(&cancel, async { Ok::<_, std::io::Error>(()) })
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        manager
            .throttle_request(&cancel, async { Ok::<_, std::io::Error>(()) })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_wait() {
        let cache = Arc::new(CountingCache::default());
        cache.store_last_request("example.com").await.unwrap();
        let settings = ThrottleSettings {
            min_wait: Duration::from_secs(60),
            max_wait: Duration::from_secs(60),
            download_recursion_threshold: 10,
        };
        let manager = manager(cache.clone(), settings);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = manager
            .throttle_request(&cancel, async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            })
            .await;

        assert!(matches!(result, Err(ThrottleError::Cancelled { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        // only the seed write above
        assert_eq!(cache.stores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_ceiling() {
        let cache = Arc::new(CountingCache::default());
        cache.stuck_download.store(true, Ordering::SeqCst);
        let manager = manager(cache.clone(), ThrottleSettings::default());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = manager
            .throttle_download(&CancellationToken::new(), async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            })
            .await;

        match result {
            Err(ThrottleError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2000),
            other => panic!("expected exhausted, got {:?}", other),
        }
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_flag_reset_after_failure() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache.clone(), fast_settings());

        let result: Result<Vec<u8>, _> = manager
            .throttle_download(&CancellationToken::new(), async {
                Err(std::io::Error::other("404"))
            })
            .await;

        assert!(matches!(
            result,
            Err(ThrottleError::Action {
                context: ThrottleContext::Download,
                ..
            })
        ));
        assert_eq!(cache.download_resets.load(Ordering::SeqCst), 1);
        assert!(!cache.is_active_download("example.com").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_download_clears_flag() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache.clone(), fast_settings());
        let cancel = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            Duration::from_secs(1),
            manager.throttle_download(&cancel, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, std::io::Error>(())
            }),
        )
        .await;
        assert!(timed_out.is_err());

        // let the spawned write-back run
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.is_active_download("example.com").await.unwrap());
        assert_eq!(cache.download_resets.load(Ordering::SeqCst), 1);

        let next = manager
            .throttle_download(&cancel, async { Ok::<_, std::io::Error>(7u8) })
            .await;
        assert_eq!(next.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_is_recorded() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache.clone(), fast_settings());

        let timed_out = tokio::time::timeout(
            Duration::from_secs(1),
            manager.throttle_request(&CancellationToken::new(), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, std::io::Error>(())
            }),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.stores.load(Ordering::SeqCst), 1);
        assert!(cache
            .last_request_time("example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_waits_for_flag() {
        let cache = Arc::new(CountingCache::default());
        cache.set_active_download("example.com", true).await.unwrap();
        let manager = manager(cache.clone(), fast_settings());

        let releaser = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.set_active_download("example.com", false).await.unwrap();
        });

        let bytes = manager
            .throttle_download(&CancellationToken::new(), async {
                Ok::<_, std::io::Error>(vec![1u8, 2, 3])
            })
            .await
            .unwrap();

        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(!cache.is_active_download("example.com").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_downloads_and_requests_do_not_block_each_other() {
        let cache = Arc::new(CountingCache::default());
        let manager = manager(cache, fast_settings());
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // the request holds its lock until the download has finished
        let request = manager.throttle_request(&cancel, async move {
            rx.await.map_err(|e| std::io::Error::other(e.to_string()))
        });
        let download = async {
            let result = manager
                .throttle_download(&cancel, async { Ok::<_, std::io::Error>(()) })
                .await;
            let _ = tx.send(());
            result
        };

        let (request, download) = tokio::join!(request, download);
        assert!(request.is_ok());
        assert!(download.is_ok());
    }
}
