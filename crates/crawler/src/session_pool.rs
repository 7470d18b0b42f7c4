use crate::browser::{BrowserSession, LaunchOptions, SessionLauncher};
use crate::metrics::Metrics;
use job_hive_common::{CrawlError, PoolConfig, PoolStatus, SessionStatus};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pool key used by the orchestrator for its pinned session
pub const DEFAULT_SESSION_KEY: &str = "default";

struct PooledSession {
    session: Arc<dyn BrowserSession>,
    created_at: Instant,
    last_used_at: Instant,
    idle: bool,
}

#[derive(Default)]
struct PoolState {
    sessions: HashMap<String, PooledSession>,
    /// Keys whose browser is being launched outside the lock
    launching: HashSet<String>,
}

impl PoolState {
    /// Least recently used idle session
    fn lru_idle(&self) -> Option<String> {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.idle)
            .min_by_key(|(_, entry)| entry.last_used_at)
            .map(|(key, _)| key.clone())
    }
}

/// Bounded set of keyed browser sessions with idle eviction.
///
/// Every map mutation, including victim selection for the idle sweep and for
/// capacity eviction, happens under `state`. Browser launches and closes run
/// after the lock is dropped.
pub struct SessionPool {
    launcher: Arc<dyn SessionLauncher>,
    state: Mutex<PoolState>,
    config: PoolConfig,
    metrics: Metrics,

    total_sessions_created: AtomicU64,
    total_sessions_evicted: AtomicU64,
}

impl SessionPool {
    pub fn new(config: PoolConfig, launcher: Arc<dyn SessionLauncher>, metrics: Metrics) -> Self {
        info!(
            "Session pool configured: max {} session(s), idle timeout {:?}",
            config.max_sessions, config.idle_timeout
        );
        Self {
            launcher,
            state: Mutex::new(PoolState::default()),
            config,
            metrics,
            total_sessions_created: AtomicU64::new(0),
            total_sessions_evicted: AtomicU64::new(0),
        }
    }

    /// Launch options for a new session, using the pool's browser settings
    pub fn launch_options(&self, headless: bool) -> LaunchOptions {
        LaunchOptions {
            headless,
            browser_path: self.config.browser_path.clone(),
            navigation_timeout: self.config.navigation_timeout,
        }
    }

    /// Hand out the session for `key`, launching one if needed.
    ///
    /// An idle session for `key` is reused. A session for `key` that is in use
    /// or still launching is never duplicated (`SessionBusy`). At capacity the
    /// least recently used idle session is evicted, but only once the new
    /// browser has launched; a failed launch leaves the pool untouched. With no
    /// idle session to evict the call fails with `CapacityExceeded`.
    pub async fn acquire(
        &self,
        key: &str,
        options: &LaunchOptions,
    ) -> Result<Arc<dyn BrowserSession>, CrawlError> {
        {
            let mut state = self.state.lock().await;

            if state.launching.contains(key) {
                return Err(CrawlError::SessionBusy {
                    key: key.to_string(),
                });
            }
            if let Some(entry) = state.sessions.get_mut(key) {
                if !entry.idle {
                    return Err(CrawlError::SessionBusy {
                        key: key.to_string(),
                    });
                }
                entry.idle = false;
                entry.last_used_at = Instant::now();
                debug!(key = %key, "Reusing idle session");
                let session = entry.session.clone();
                self.record_sizes(&state);
                return Ok(session);
            }

            let occupied = state.sessions.len() + state.launching.len();
            if occupied >= self.config.max_sessions && state.lru_idle().is_none() {
                info!(
                    key = %key,
                    "Cannot create new session - at max capacity ({}/{}) with no idle session",
                    occupied,
                    self.config.max_sessions
                );
                return Err(CrawlError::CapacityExceeded {
                    max: self.config.max_sessions,
                });
            }
            state.launching.insert(key.to_string());
        }

        let launched = self.launcher.launch(key, options).await;

        let mut state = self.state.lock().await;
        state.launching.remove(key);

        let session = match launched {
            Ok(session) => session,
            Err(e) => {
                warn!(key = %key, "Failed to launch browser session: {:#}", e);
                return Err(CrawlError::SessionLaunch {
                    key: key.to_string(),
                    source: e.into(),
                });
            }
        };

        let mut evicted = None;
        if state.sessions.len() + state.launching.len() >= self.config.max_sessions {
            let victim = state.lru_idle();
            match victim {
                Some(victim_key) => {
                    info!(
                        key = %key,
                        "Pool at capacity ({}/{}), evicting least recently used session '{}'",
                        state.sessions.len(),
                        self.config.max_sessions,
                        victim_key
                    );
                    evicted = state
                        .sessions
                        .remove(&victim_key)
                        .map(|entry| (victim_key, entry));
                    self.total_sessions_evicted.fetch_add(1, Ordering::SeqCst);
                }
                None => {
                    // The idle session seen before launching was taken meanwhile
                    drop(state);
                    info!(
                        key = %key,
                        "Capacity taken while launching, discarding new session"
                    );
                    close_session(key, &session).await;
                    return Err(CrawlError::CapacityExceeded {
                        max: self.config.max_sessions,
                    });
                }
            }
        }

        let now = Instant::now();
        state.sessions.insert(
            key.to_string(),
            PooledSession {
                session: session.clone(),
                created_at: now,
                last_used_at: now,
                idle: false,
            },
        );
        self.total_sessions_created.fetch_add(1, Ordering::SeqCst);
        info!(
            key = %key,
            "Created new session ({}/{})",
            state.sessions.len(),
            self.config.max_sessions
        );
        self.record_sizes(&state);
        drop(state);

        if let Some((victim_key, entry)) = evicted {
            close_session(&victim_key, &entry.session).await;
        }

        Ok(session)
    }

    /// Return the session for `key` to the pool: secondary pages are closed and
    /// the session becomes idle. Unknown keys are ignored.
    pub async fn release(&self, key: &str) {
        let session = {
            let state = self.state.lock().await;
            match state.sessions.get(key) {
                Some(entry) if !entry.idle => entry.session.clone(),
                Some(_) => return,
                None => {
                    debug!(key = %key, "Release of unknown session ignored");
                    return;
                }
            }
        };

        // The session is still in use here, so neither sweep nor eviction can take it
        match session.close_secondary_pages().await {
            Ok(0) => {}
            Ok(closed) => debug!(key = %key, "Closed {} secondary page(s)", closed),
            Err(e) => warn!(key = %key, "Failed to close secondary pages: {:#}", e),
        }

        let mut state = self.state.lock().await;
        if let Some(entry) = state.sessions.get_mut(key) {
            if Arc::ptr_eq(&entry.session, &session) {
                entry.idle = true;
                entry.last_used_at = Instant::now();
            }
        }
        self.record_sizes(&state);
    }

    /// Delete the session for `key` and terminate its browser
    pub async fn remove(&self, key: &str) {
        let removed = {
            let mut state = self.state.lock().await;
            let removed = state.sessions.remove(key);
            self.record_sizes(&state);
            removed
        };

        if let Some(entry) = removed {
            info!(key = %key, "Removing session");
            close_session(key, &entry.session).await;
        }
    }

    /// Refresh the last-used time of a session without changing its state
    pub async fn touch(&self, key: &str) {
        if let Some(entry) = self.state.lock().await.sessions.get_mut(key) {
            entry.last_used_at = Instant::now();
        }
    }

    /// Remove every idle session unused for longer than the idle timeout.
    /// Returns how many sessions were removed.
    pub async fn sweep_idle(&self) -> usize {
        let expired: Vec<(String, PooledSession)> = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let keys: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, entry)| {
                    entry.idle && now.duration_since(entry.last_used_at) > self.config.idle_timeout
                })
                .map(|(key, _)| key.clone())
                .collect();

            let expired = keys
                .into_iter()
                .filter_map(|key| state.sessions.remove(&key).map(|entry| (key, entry)))
                .collect();
            self.record_sizes(&state);
            expired
        };

        for (key, entry) in &expired {
            info!(
                key = %key,
                "Closing idle session (age: {:?})",
                entry.created_at.elapsed()
            );
            close_session(key, &entry.session).await;
        }

        self.total_sessions_evicted
            .fetch_add(expired.len() as u64, Ordering::SeqCst);
        expired.len()
    }

    /// Run `sweep_idle` every sweep interval until `token` is cancelled
    pub fn start_idle_monitor(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();
        let interval = self.config.sweep_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Idle monitor stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let removed = pool.sweep_idle().await;
                        if removed > 0 {
                            info!("Idle monitor swept {} session(s)", removed);
                        }
                    }
                }
            }
        })
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let now = Instant::now();

        let mut entries: Vec<SessionStatus> = state
            .sessions
            .iter()
            .map(|(key, entry)| SessionStatus {
                key: key.clone(),
                idle: entry.idle,
                age_secs: now.duration_since(entry.created_at).as_secs(),
                idle_for_secs: if entry.idle {
                    now.duration_since(entry.last_used_at).as_secs()
                } else {
                    0
                },
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        PoolStatus {
            size: state.sessions.len(),
            max_size: self.config.max_sessions,
            sessions: entries,
            total_sessions_created: self.total_sessions_created.load(Ordering::SeqCst),
            total_sessions_evicted: self.total_sessions_evicted.load(Ordering::SeqCst),
        }
    }

    /// Remove every session, in use or not
    pub async fn shutdown(&self) {
        let drained: Vec<(String, PooledSession)> = {
            let mut state = self.state.lock().await;
            let drained = state.sessions.drain().collect();
            self.record_sizes(&state);
            drained
        };

        info!("Shutting down session pool ({} session(s))", drained.len());
        for (key, entry) in &drained {
            close_session(key, &entry.session).await;
        }
    }

    fn record_sizes(&self, state: &PoolState) {
        let idle = state.sessions.values().filter(|entry| entry.idle).count();
        self.metrics.set_pool_sizes(state.sessions.len(), idle);
    }
}

async fn close_session(key: &str, session: &Arc<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        warn!(key = %key, "Failed to close browser session: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;
    use std::time::Duration;

    fn pool_with(launcher: Arc<FakeLauncher>, max_sessions: usize) -> SessionPool {
        let config = PoolConfig {
            max_sessions,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            ..PoolConfig::default()
        };
        SessionPool::new(config, launcher, Metrics::new().unwrap())
    }

    #[tokio::test]
    async fn test_acquire_reuses_idle_session() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        pool.release("a").await;
        pool.acquire("a", &options).await.unwrap();

        assert_eq!(launcher.launches(), 1);
        let status = pool.status().await;
        assert_eq!(status.size, 1);
        assert!(!status.sessions[0].idle);
    }

    #[tokio::test]
    async fn test_acquire_in_use_key_is_busy() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        let err = pool.acquire("a", &options).await.err().unwrap();

        assert!(matches!(err, CrawlError::SessionBusy { ref key } if key == "a"));
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_exactly_the_oldest_idle_session() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        pool.release("a").await;
        tokio::time::advance(Duration::from_secs(5)).await;
        pool.acquire("b", &options).await.unwrap();
        pool.release("b").await;

        pool.acquire("c", &options).await.unwrap();

        let status = pool.status().await;
        let keys: Vec<&str> = status.sessions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(status.total_sessions_evicted, 1);
        assert!(launcher.sessions_for("a")[0].is_closed());
        assert!(!launcher.sessions_for("b")[0].is_closed());
    }

    #[tokio::test]
    async fn test_capacity_without_idle_sessions_rejects() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        pool.acquire("b", &options).await.unwrap();
        let err = pool.acquire("c", &options).await.err().unwrap();

        assert!(matches!(err, CrawlError::CapacityExceeded { max: 2 }));
        assert_eq!(pool.status().await.size, 2);
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces_as_session_launch() {
        let launcher = FakeLauncher::new();
        launcher.fail_launches(true);
        let pool = pool_with(launcher.clone(), 2);

        let err = pool
            .acquire("a", &pool.launch_options(true))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, CrawlError::SessionLaunch { ref key, .. } if key == "a"));
        assert_eq!(pool.status().await.size, 0);
    }

    #[tokio::test]
    async fn test_failed_launch_at_capacity_keeps_idle_session() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 1);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        pool.release("a").await;
        launcher.fail_launches(true);

        let err = pool.acquire("b", &options).await.err().unwrap();

        assert!(matches!(err, CrawlError::SessionLaunch { ref key, .. } if key == "b"));
        let status = pool.status().await;
        assert_eq!(status.size, 1);
        assert_eq!(status.sessions[0].key, "a");
        assert_eq!(status.total_sessions_evicted, 0);
        assert!(!launcher.sessions_for("a")[0].is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_runs_outside_the_pool_lock() {
        let launcher = FakeLauncher::new();
        launcher.set_launch_delay(Duration::from_secs(10));
        let pool = Arc::new(pool_with(launcher.clone(), 2));

        let launching = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("a", &pool.launch_options(true)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let status = tokio::time::timeout(Duration::from_millis(10), pool.status())
            .await
            .expect("status blocked by a running launch");
        assert_eq!(status.size, 0);
        let err = pool
            .acquire("a", &pool.launch_options(true))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CrawlError::SessionBusy { .. }));

        launching.await.unwrap().unwrap();
        assert_eq!(pool.status().await.size, 1);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_release_unknown_key_is_noop() {
        let pool = pool_with(FakeLauncher::new(), 2);
        pool.release("missing").await;
        assert_eq!(pool.status().await.size, 0);
    }

    #[tokio::test]
    async fn test_release_closes_secondary_pages() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);

        let session = pool.acquire("a", &pool.launch_options(true)).await.unwrap();
        session.open_page().await.unwrap();
        session.open_page().await.unwrap();
        pool.release("a").await;

        let fake = &launcher.sessions_for("a")[0];
        assert_eq!(fake.pages_opened(), 2);
        assert_eq!(fake.open_pages(), 0);
        assert!(!fake.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_only_removes_expired_idle_sessions() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 3);
        let options = pool.launch_options(true);

        pool.acquire("stale", &options).await.unwrap();
        pool.release("stale").await;
        pool.acquire("busy", &options).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        pool.acquire("fresh", &options).await.unwrap();
        pool.release("fresh").await;

        assert_eq!(pool.sweep_idle().await, 1);

        let status = pool.status().await;
        let keys: Vec<&str> = status.sessions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["busy", "fresh"]);
        assert!(launcher.sessions_for("stale")[0].is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defers_idle_expiry() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 2);

        pool.acquire("a", &pool.launch_options(true)).await.unwrap();
        pool.release("a").await;
        tokio::time::advance(Duration::from_secs(200)).await;
        pool.touch("a").await;
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(pool.sweep_idle().await, 0);
        tokio::time::advance(Duration::from_secs(101)).await;
        assert_eq!(pool.sweep_idle().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_monitor_sweeps_until_cancelled() {
        let launcher = FakeLauncher::new();
        let pool = Arc::new(pool_with(launcher.clone(), 2));

        pool.acquire("a", &pool.launch_options(true)).await.unwrap();
        pool.release("a").await;

        let token = CancellationToken::new();
        let handle = pool.start_idle_monitor(token.clone());
        tokio::time::sleep(Duration::from_secs(361)).await;

        assert_eq!(pool.status().await.size, 0);
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_and_shutdown_close_browsers() {
        let launcher = FakeLauncher::new();
        let pool = pool_with(launcher.clone(), 3);
        let options = pool.launch_options(true);

        pool.acquire("a", &options).await.unwrap();
        pool.acquire("b", &options).await.unwrap();
        pool.remove("a").await;
        pool.remove("a").await;

        assert!(launcher.sessions_for("a")[0].is_closed());
        assert_eq!(pool.status().await.size, 1);

        pool.shutdown().await;
        assert!(launcher.sessions_for("b")[0].is_closed());
        assert_eq!(pool.status().await.size, 0);
    }
}
