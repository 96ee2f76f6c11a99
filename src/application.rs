//! Application layer module
//!
//! Collection jobs, poster localization and the `CollectorService` control
//! surface that orchestrate the domain logic.

pub mod catalog_client;
pub mod collection_job;
pub mod context;
pub mod image_localizer;
pub mod job_registry;
pub mod normalizer;
pub mod service;
pub mod upserter;

pub use catalog_client::{CatalogClient, CatalogError, CatalogQuery, SourceProbe, build_url};
pub use collection_job::CollectionJob;
pub use context::{CollectorContext, UpsertLocks};
pub use image_localizer::{LocalizationError, LocalizationManager, LocalizationStatus, VerifyReport};
pub use job_registry::{JobRegistry, RegistryError};
pub use normalizer::{NormalizeError, NormalizedVideo, clean_play_urls, derive_vod_id, normalize};
pub use service::{ClearReport, CollectorService};
pub use upserter::{UpsertOutcome, upsert_record};
