//! The download worker pool
//!
//! A fixed set of persistent worker tasks shares one unbounded request
//! queue. Each worker owns a private fetcher (and therefore a private
//! session cookie), deposits its result into the request's own oneshot
//! slot, and throttles itself with a randomized sleep between jobs.
//!
//! Two background tasks ride along: a supervisor that spawns a replacement
//! whenever a worker crashes, and a flush timer that wholesale-clears the
//! shared response cache on a fixed interval (the cache's only eviction
//! mechanism).
//!
//! Completion order is not FIFO: whichever idle worker dequeues first wins.
//! The only guarantee is that every submitted request resolves to exactly
//! one payload or one typed error.

mod downloader;

pub use downloader::Downloader;

use crate::cache::CacheStore;
use crate::fetch::{Fetch, FetchError};
use futures::FutureExt;
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Builds one fetcher per worker, including replacements for crashed
/// workers, so every worker gets its own session.
pub type FetcherFactory = Arc<dyn Fn() -> Box<dyn Fetch + Send> + Send + Sync>;

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of persistent download workers.
    pub workers: usize,

    /// Base inter-request sleep per worker, scaled by `U(1.0, 1.5)`.
    pub sleep_time: Duration,

    /// How often the shared response cache is flushed.
    pub cache_flush_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            sleep_time: Duration::from_secs(10),
            cache_flush_interval: Duration::from_secs(300),
        }
    }
}

/// A queued unit of work, or the shutdown sentinel.
enum Job {
    Fetch {
        url: String,
        reply: oneshot::Sender<Result<Vec<u8>, FetchError>>,
    },
    Shutdown,
}

type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

/// The shared download pool.
pub struct DownloadPool {
    job_tx: mpsc::UnboundedSender<Job>,
    live_workers: Arc<AtomicUsize>,
    closed: AtomicBool,
    supervisor: JoinHandle<()>,
    flush_timer: JoinHandle<()>,
}

impl DownloadPool {
    /// Starts the pool: `config.workers` workers, the crash supervisor and
    /// the cache flush timer.
    pub fn start(config: PoolConfig, cache: CacheStore, factory: FetcherFactory) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));
        let live_workers = Arc::new(AtomicUsize::new(0));
        let (respawn_tx, mut respawn_rx) = mpsc::unbounded_channel::<()>();

        for id in 0..config.workers {
            spawn_worker(
                id,
                factory.clone(),
                queue.clone(),
                config.sleep_time,
                live_workers.clone(),
                respawn_tx.clone(),
            );
        }

        let supervisor = tokio::spawn({
            let factory = factory.clone();
            let queue = queue.clone();
            let live_workers = live_workers.clone();
            let sleep_time = config.sleep_time;
            let mut next_id = config.workers;
            async move {
                while respawn_rx.recv().await.is_some() {
                    tracing::info!("spawning replacement download worker {}", next_id);
                    spawn_worker(
                        next_id,
                        factory.clone(),
                        queue.clone(),
                        sleep_time,
                        live_workers.clone(),
                        respawn_tx.clone(),
                    );
                    next_id += 1;
                }
            }
        });

        let flush_timer = tokio::spawn({
            let cache = cache.clone();
            let period = config.cache_flush_interval;
            async move {
                let mut interval = tokio::time::interval(period);
                // The first tick completes immediately; skip it so the
                // cache survives a full interval before the first flush.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let evicted = cache.clear();
                    tracing::debug!("flushed {} cached responses", evicted);
                }
            }
        });

        Self {
            job_tx,
            live_workers,
            closed: AtomicBool::new(false),
            supervisor,
            flush_timer,
        }
    }

    /// Submits a URL and blocks the caller until a worker deposits the
    /// payload or an error into this request's slot.
    pub async fn submit(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::PoolClosed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.job_tx
            .send(Job::Fetch {
                url: url.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| FetchError::PoolClosed)?;

        reply_rx.await.map_err(|_| FetchError::PoolClosed)?
    }

    /// Number of currently live workers. Replacement after a crash briefly
    /// dips this below the configured size.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Shuts the pool down: one sentinel per live worker, then the
    /// supervisor and flush timer stop. Later `submit` calls fail with
    /// [`FetchError::PoolClosed`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let live = self.live_workers.load(Ordering::SeqCst);
        tracing::info!("shutting down download pool ({} workers)", live);
        for _ in 0..live {
            let _ = self.job_tx.send(Job::Shutdown);
        }
        self.supervisor.abort();
        self.flush_timer.abort();
    }
}

impl Drop for DownloadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns one worker task onto the runtime.
fn spawn_worker(
    id: usize,
    factory: FetcherFactory,
    queue: JobQueue,
    sleep_time: Duration,
    live_workers: Arc<AtomicUsize>,
    respawn_tx: mpsc::UnboundedSender<()>,
) {
    live_workers.fetch_add(1, Ordering::SeqCst);

    tokio::spawn(async move {
        let mut fetcher = factory();
        tracing::debug!("download worker {} started", id);

        loop {
            let job = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            let Some(job) = job else {
                break;
            };

            match job {
                Job::Shutdown => {
                    tracing::debug!("download worker {} shutting down", id);
                    break;
                }
                Job::Fetch { url, reply } => {
                    let outcome = AssertUnwindSafe(fetcher.fetch(&url)).catch_unwind().await;
                    match outcome {
                        Ok(result) => {
                            // The caller may have given up; a dropped slot
                            // is not the worker's problem.
                            let _ = reply.send(result);
                            let jitter: f64 = rand::thread_rng().gen_range(1.0..1.5);
                            tokio::time::sleep(sleep_time.mul_f64(jitter)).await;
                        }
                        Err(_) => {
                            tracing::warn!(
                                "download worker {} crashed fetching {}, requesting replacement",
                                id,
                                url
                            );
                            let _ = respawn_tx.send(());
                            let _ = reply.send(Err(FetchError::WorkerFaulted));
                            // Finish this iteration only; do not re-enter
                            // the loop with a possibly-poisoned fetcher.
                            break;
                        }
                    }
                }
            }
        }

        live_workers.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("download worker {} exited", id);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Scripted fetcher: panics on URLs containing "boom", errors on URLs
    /// containing "missing", echoes everything else.
    struct ScriptedFetcher;

    #[async_trait]
    impl Fetch for ScriptedFetcher {
        async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
            if url.contains("boom") {
                panic!("scripted crash");
            }
            if url.contains("missing") {
                return Err(FetchError::NotFound {
                    url: url.to_string(),
                });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn scripted_factory() -> FetcherFactory {
        Arc::new(|| Box::new(ScriptedFetcher))
    }

    fn fast_config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            sleep_time: Duration::from_millis(1),
            cache_flush_interval: Duration::from_secs(300),
        }
    }

    async fn wait_for_workers(pool: &DownloadPool, expected: usize) {
        for _ in 0..100 {
            if pool.live_workers() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "pool never reached {} workers (at {})",
            expected,
            pool.live_workers()
        );
    }

    #[tokio::test]
    async fn test_submit_returns_payload() {
        let pool = DownloadPool::start(fast_config(2), CacheStore::new(), scripted_factory());

        let payload = pool.submit("http://example.com/ok").await.unwrap();
        assert_eq!(payload, b"http://example.com/ok");
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_submit_propagates_typed_errors() {
        let pool = DownloadPool::start(fast_config(2), CacheStore::new(), scripted_factory());

        let err = pool.submit("http://example.com/missing").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        // A typed error does not cost a worker.
        assert_eq!(pool.live_workers(), 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_crashed_worker_resolves_request_and_is_replaced() {
        let pool = DownloadPool::start(fast_config(3), CacheStore::new(), scripted_factory());
        wait_for_workers(&pool, 3).await;

        let err = pool.submit("http://example.com/boom").await.unwrap_err();
        assert!(matches!(err, FetchError::WorkerFaulted));

        // The supervisor restores capacity within one replacement cycle.
        wait_for_workers(&pool, 3).await;

        // And the pool still serves requests afterwards.
        let payload = pool.submit("http://example.com/after").await.unwrap();
        assert_eq!(payload, b"http://example.com/after");
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_submits_each_resolve_once() {
        let pool = Arc::new(DownloadPool::start(
            fast_config(4),
            CacheStore::new(),
            scripted_factory(),
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let url = format!("http://example.com/job/{}", i);
                (i, pool.submit(&url).await.unwrap())
            }));
        }

        for handle in handles {
            let (i, payload) = handle.await.unwrap();
            assert_eq!(payload, format!("http://example.com/job/{}", i).as_bytes());
        }
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_submits() {
        let pool = DownloadPool::start(fast_config(2), CacheStore::new(), scripted_factory());
        pool.shutdown();

        let err = pool.submit("http://example.com/late").await.unwrap_err();
        assert!(matches!(err, FetchError::PoolClosed));
    }

    #[tokio::test]
    async fn test_shutdown_drains_workers() {
        let pool = DownloadPool::start(fast_config(4), CacheStore::new(), scripted_factory());
        wait_for_workers(&pool, 4).await;

        pool.shutdown();
        wait_for_workers(&pool, 0).await;
    }

    #[tokio::test]
    async fn test_flush_timer_clears_cache() {
        let cache = CacheStore::new();
        cache.put("http://example.com/a.xml", vec![1, 2, 3]);

        let config = PoolConfig {
            workers: 1,
            sleep_time: Duration::from_millis(1),
            cache_flush_interval: Duration::from_millis(50),
        };
        let pool = DownloadPool::start(config, cache.clone(), scripted_factory());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.is_empty(), "flush timer never cleared the cache");
        pool.shutdown();
    }
}
