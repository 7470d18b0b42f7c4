//! Capability interfaces over an automated browser.
//!
//! The session pool, the orchestrator and the strategies only talk to these
//! traits; `crate::chrome` provides the headless Chrome implementation.
//! Navigation, element waits and launches are suspension points: an
//! implementation must not block the async runtime while it waits on the browser.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Options that only matter when a browser process is launched
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub browser_path: Option<PathBuf>,
    /// Default timeout for navigation and element waits on every page
    pub navigation_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            browser_path: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// A single browser tab
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait until the navigation has settled
    async fn navigate(&self, url: &str) -> Result<()>;

    fn current_url(&self) -> String;

    /// Serialized DOM of the current document
    async fn content(&self) -> Result<String>;

    /// Wait for `selector` to appear. `Ok(false)` means it did not appear in time.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}

/// One browser process with an isolated browsing context and a primary page
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn primary_page(&self) -> Arc<dyn Page>;

    /// Open a new page inside this session's isolated context
    async fn open_page(&self) -> Result<Arc<dyn Page>>;

    /// Close every page except the primary one. Returns how many were closed.
    async fn close_secondary_pages(&self) -> Result<usize>;

    /// Close the context and terminate the browser process
    async fn close(&self) -> Result<()>;
}

/// Launches browser sessions for the pool
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, key: &str, options: &LaunchOptions) -> Result<Arc<dyn BrowserSession>>;
}
