pub mod config;
pub mod error;
pub mod relative_time;
pub mod types;
pub mod utils;

pub use config::*;
pub use error::{BoxError, CrawlError};
pub use relative_time::normalize_posted_at;
pub use types::*;
