//! Headless Chrome implementation of the browser capability traits.
//!
//! Every pooled session owns its own Chrome process. Pages are created inside
//! one isolated CDP BrowserContext (separate cookies/storage) so sessions never
//! share state even when they run against the same site.
//!
//! headless_chrome is synchronous: every CDP round trip runs on tokio's
//! blocking pool so navigation and element waits never stall the runtime.

use crate::browser::{BrowserSession, LaunchOptions, Page, SessionLauncher};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Target::CreateTarget;
use headless_chrome::{Browser, LaunchOptions as ChromeLaunchOptions};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Chrome launch arguments required to run inside containers.
const CONTAINER_ARGS: &[&str] = &[
    // Chrome's namespace sandbox requires SYS_ADMIN inside containers
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--window-size=1920,1080",
    // Keep timers running in background tabs while paginating
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
];

/// Launches one Chrome process per pooled session
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Pre-flight check: verify browser binary exists and log useful diagnostics
    fn verify_browser_binary(binary_path: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;

        if !binary_path.exists() {
            warn!(
                "Browser binary not found at '{}'. \
                 headless_chrome will attempt auto-detection.",
                binary_path.display()
            );
            return;
        }

        match std::fs::metadata(binary_path) {
            Ok(metadata) => {
                let mode = metadata.permissions().mode();
                if mode & 0o111 == 0 {
                    warn!(
                        "Browser binary '{}' exists but is NOT executable (mode: {:o})",
                        binary_path.display(),
                        mode
                    );
                } else {
                    debug!(
                        "Browser binary verified: '{}' (mode: {:o})",
                        binary_path.display(),
                        mode
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Cannot read metadata for browser binary '{}': {}",
                    binary_path.display(),
                    e
                );
            }
        }

        let uid = unsafe { libc::getuid() };
        if uid != 0 {
            debug!(
                "Running as non-root user (uid: {}); --no-sandbox is always passed",
                uid
            );
        }
    }
}

/// Run a synchronous browser call on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Browser task failed: {}", e))?
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self, key: &str, options: &LaunchOptions) -> Result<Arc<dyn BrowserSession>> {
        let key = key.to_string();
        let options = options.clone();
        blocking(move || Self::launch_sync(&key, &options)).await
    }
}

impl ChromeLauncher {
    fn launch_sync(key: &str, options: &LaunchOptions) -> Result<Arc<dyn BrowserSession>> {
        let start_time = Instant::now();

        let chrome_args: Vec<&'static OsStr> =
            CONTAINER_ARGS.iter().map(|arg| OsStr::new(*arg)).collect();

        info!(
            key = %key,
            "Launching Chrome in {} mode with {} args",
            if options.headless { "HEADLESS" } else { "HEADFUL" },
            chrome_args.len()
        );

        let mut launch_builder = ChromeLaunchOptions::default_builder();
        launch_builder
            .headless(options.headless)
            // The default 30s idle timeout closes the websocket between pagination
            // steps; the pool's own idle sweep decides when a browser goes away.
            .idle_browser_timeout(Duration::from_secs(3600))
            .args(chrome_args);

        if let Some(ref browser_path) = options.browser_path {
            Self::verify_browser_binary(browser_path);
            launch_builder.path(Some(browser_path.clone()));
        }

        let launch_options = launch_builder
            .build()
            .map_err(|e| anyhow!("Failed to build launch options: {}", e))?;

        let browser = Browser::new(launch_options).map_err(|e| {
            tracing::error!(
                key = %key,
                "Browser failed to launch: {}. Check that the browser binary exists, \
                 is executable and that its shared libraries are installed.",
                e
            );
            e
        })?;

        // Isolated CDP BrowserContext (like incognito) holding the primary tab
        let (context_id, primary_tab) = {
            let context = browser
                .new_context()
                .map_err(|e| anyhow!("Failed to create isolated CDP context: {}", e))?;
            let tab = context
                .new_tab()
                .map_err(|e| anyhow!("Failed to create tab in isolated context: {}", e))?;
            (context.get_id().to_string(), tab)
        };
        primary_tab.set_default_timeout(options.navigation_timeout);

        info!(
            key = %key,
            "Browser session ready (context {}) in {}ms",
            context_id,
            start_time.elapsed().as_millis()
        );

        Ok(Arc::new(ChromeSession {
            key: key.to_string(),
            browser: Mutex::new(Some(browser)),
            context_id,
            primary: Arc::new(ChromePage { tab: primary_tab }),
            navigation_timeout: options.navigation_timeout,
        }))
    }
}

pub struct ChromeSession {
    key: String,
    /// Taken on close; the process exits once the last `Browser` clone is dropped
    browser: Mutex<Option<Browser>>,
    context_id: String,
    primary: Arc<ChromePage>,
    navigation_timeout: Duration,
}

impl ChromeSession {
    fn browser(&self) -> Result<Browser> {
        let guard = self
            .browser
            .lock()
            .map_err(|_| anyhow!("browser handle lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| anyhow!("browser session '{}' is closed", self.key))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn primary_page(&self) -> Arc<dyn Page> {
        self.primary.clone()
    }

    async fn open_page(&self) -> Result<Arc<dyn Page>> {
        let browser = self.browser()?;
        let context_id = self.context_id.clone();
        let navigation_timeout = self.navigation_timeout;

        let tab = blocking(move || {
            let create_target = CreateTarget {
                url: "about:blank".to_string(),
                width: None,
                height: None,
                browser_context_id: Some(context_id.clone()),
                enable_begin_frame_control: None,
                new_window: None,
                background: None,
                for_tab: None,
                left: None,
                top: None,
                window_state: None,
                hidden: None,
            };
            let tab = browser.new_tab_with_options(create_target).map_err(|e| {
                anyhow!("Failed to create tab in CDP context {}: {}", context_id, e)
            })?;
            tab.set_default_timeout(navigation_timeout);
            Ok(tab)
        })
        .await?;

        debug!(key = %self.key, "Opened page {}", tab.get_target_id());
        Ok(Arc::new(ChromePage { tab }))
    }

    async fn close_secondary_pages(&self) -> Result<usize> {
        let browser = self.browser()?;
        let primary_id = self.primary.tab.get_target_id().clone();
        let key = self.key.clone();

        blocking(move || {
            let secondary: Vec<Arc<Tab>> = {
                let tabs = browser
                    .get_tabs()
                    .lock()
                    .map_err(|_| anyhow!("tab list lock poisoned"))?;
                tabs.iter()
                    .filter(|tab| *tab.get_target_id() != primary_id)
                    .cloned()
                    .collect()
            };

            let mut closed = 0;
            for tab in secondary {
                match tab.close(false) {
                    Ok(_) => closed += 1,
                    Err(e) => warn!(
                        key = %key,
                        "Failed to close secondary page {}: {}",
                        tab.get_target_id(),
                        e
                    ),
                }
            }
            Ok(closed)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| anyhow!("browser handle lock poisoned"))?
            .take();

        let Some(browser) = browser else {
            return Ok(());
        };

        let key = self.key.clone();
        let primary = self.primary.tab.clone();
        blocking(move || {
            // Closing the last tab of the CDP context disposes the context itself
            if let Err(e) = primary.close(false) {
                debug!(key = %key, "Primary page already gone: {}", e);
            }
            drop(browser);
            Ok(())
        })
        .await
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl Page for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    async fn content(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || tab.get_content()).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let tab = self.tab.clone();
        let selector = selector.to_string();
        blocking(move || {
            let found = tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .map(|_| ());
            match found {
                Ok(()) => Ok(true),
                Err(e) => {
                    debug!("Selector '{}' not found within {:?}: {}", selector, timeout, e);
                    Ok(false)
                }
            }
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.close(false)?;
            Ok(())
        })
        .await
    }
}
