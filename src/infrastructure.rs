//! Infrastructure layer for database connections, payload parsing, HTTP and
//! process plumbing (configuration, logging)

pub mod config;
pub mod database_connection;
pub mod event_log_repository;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod retry_manager;
pub mod source_repository;
pub mod video_repository;

pub use config::{AppConfig, CollectorConfig, HttpConfig, LocalizerConfig, LoggingConfig};
pub use database_connection::DatabaseConnection;
pub use event_log_repository::SqliteEventLog;
pub use http_client::HttpClient;
pub use logging::{LoggingGuard, init_logging_with_config};
pub use parsing::{ParsingError, ParsingResult, parse_page};
pub use retry_manager::RetryPolicy;
pub use source_repository::SqliteSourceRegistry;
pub use video_repository::SqliteVideoRepository;
