use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Strategy used when a trigger does not name one.
pub const DEFAULT_STRATEGY: &str = "weworkremotely";

/// Every 6 hours. tokio-cron-scheduler expects the seconds field first.
pub const DEFAULT_CRON: &str = "0 0 */6 * * *";

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Session pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_sessions: usize, // Hard upper bound on live browser sessions
    /// Idle sessions unused for longer than this are removed by the sweep
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Path to browser binary. If None, uses default Chrome/Chromium auto-detection.
    pub browser_path: Option<PathBuf>,
    /// Default timeout applied to every page (navigation, selector waits)
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            idle_timeout: Duration::from_secs(5 * 60), // 5 minutes
            sweep_interval: Duration::from_secs(60),
            browser_path: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Defaults for interactive (HTTP-triggered) crawls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub default_strategy: String,
    pub default_max_results: usize,
    pub headless: bool, // true = headless, false = visible window (local debugging only)
    /// Fixed delay between pagination steps
    #[serde(with = "humantime_serde")]
    pub page_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            default_strategy: DEFAULT_STRATEGY.to_string(),
            default_max_results: 50,
            headless: true,
            page_delay: Duration::from_millis(1500),
        }
    }
}

/// Scheduled collection rounds
///
/// Scheduled rounds always run headless; there is deliberately no field for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
    pub strategies: Vec<String>,
    pub max_results: usize,
    pub keyword: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: DEFAULT_CRON.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            strategies: vec![DEFAULT_STRATEGY.to_string(), "python-jobs".to_string()],
            max_results: 100,
            keyword: Some("rust".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub http_port: u16,
    /// PostgreSQL connection string. None selects the in-memory store.
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub crawl: CrawlConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pool = PoolConfig {
            max_sessions: env_positive("POOL_MAX_SESSIONS")
                .unwrap_or(defaults.pool.max_sessions),
            idle_timeout: env_parse("POOL_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.idle_timeout),
            sweep_interval: env_parse("POOL_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.sweep_interval),
            // Custom browser path (e.g., /usr/bin/chromium)
            browser_path: env::var("BROWSER_PATH").ok().map(PathBuf::from),
            navigation_timeout: env_parse("NAVIGATION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.navigation_timeout),
        };

        let crawl = CrawlConfig {
            default_strategy: env::var("CRAWL_DEFAULT_STRATEGY")
                .unwrap_or(defaults.crawl.default_strategy),
            default_max_results: env_positive("CRAWL_DEFAULT_MAX_RESULTS")
                .unwrap_or(defaults.crawl.default_max_results),
            headless: env_parse::<Flag>("CRAWL_HEADLESS")
                .map(|f| f.0)
                .unwrap_or(defaults.crawl.headless),
            page_delay: env_parse("CRAWL_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.crawl.page_delay),
        };

        let scheduler = SchedulerConfig {
            enabled: env_parse::<Flag>("SCHEDULER_ENABLED")
                .map(|f| f.0)
                .unwrap_or(defaults.scheduler.enabled),
            cron: env::var("SCHEDULER_CRON").unwrap_or(defaults.scheduler.cron),
            timezone: env::var("SCHEDULER_TIMEZONE").unwrap_or(defaults.scheduler.timezone),
            strategies: env::var("SCHEDULER_STRATEGIES")
                .ok()
                .map(|v| parse_name_list(&v))
                .filter(|names| !names.is_empty())
                .unwrap_or(defaults.scheduler.strategies),
            max_results: env_positive("SCHEDULER_MAX_RESULTS")
                .unwrap_or(defaults.scheduler.max_results),
            keyword: match env::var("SCHEDULER_KEYWORD") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(v.trim().to_string()),
                Err(_) => defaults.scheduler.keyword,
            },
        };

        let server = ServerConfig {
            http_port: env_parse("HTTP_PORT").unwrap_or(defaults.server.http_port),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
        };

        Self {
            pool,
            crawl,
            scheduler,
            server,
        }
    }
}

/// Split a comma-separated list of names, trimming whitespace and dropping empties
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Counts and sizes where zero would disable the feature fall back to defaults
fn env_positive(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| parse_positive(&v))
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse().ok().filter(|n: &usize| *n > 0)
}

/// Boolean env flag accepting 1/0, true/false, yes/no, on/off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag(pub bool);

impl FromStr for Flag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Self(true)),
            "0" | "false" | "no" | "off" => Ok(Self(false)),
            _ => Err(()),
        }
    }
}
