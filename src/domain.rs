//! Domain module - catalog entities, job state and collaborator interfaces
//!
//! Each module is its own file in the domain/ directory; commonly used
//! items are re-exported here.

pub mod collection;
pub mod constants;
pub mod events;
pub mod job;
pub mod repositories;
pub mod services;
pub mod source;
pub mod video;

pub use collection::{Category, CollectAction, CollectionParams, PageResult, RawRecord};
pub use events::{EventEntry, EventKind, EventLevel, EventStats};
pub use job::{JobSnapshot, JobStatus};
pub use repositories::{CategoryBindings, EventLog, SourceRegistry, VideoRepository};
pub use services::{CatalogTransport, FetchError, ImageFetcher, RequestOptions};
pub use source::{NewSource, SourceDescriptor, WireFormat};
pub use video::{NewVideo, VideoFields, VideoFilter, VideoPatch, VideoRecord};
