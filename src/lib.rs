//! vod-collector - video catalog ingestion from MacCMS-compatible sources
//!
//! Fetches paginated catalog listings (JSON or XML), normalizes and upserts
//! the records into a SQLite store, and localizes poster images.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{CollectorContext, CollectorService};
pub use infrastructure::AppConfig;
