//! Dataset-marketplace delivery engine.
//!
//! Marks every paid download with an invisible per-purchase identifier so a
//! leaked copy can be traced back to its buyer, and keeps the relational,
//! document, and blob stores consistent across dataset delete/restore through
//! a transactional outbox.
//!
//! The pieces:
//! - [`fingerprint`]: zero-width Unicode watermark codec for JSON-lines text
//! - [`download`]: streaming watermark pipeline with live progress
//! - [`catalog`]: registration, uploads, purchases, delete/restore
//! - [`relay`]: outbox sweep executing deferred cross-store deletions
//! - [`db`], [`blob`], [`cache`], [`preview`]: the backing stores

pub mod blob;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod download;
pub mod fingerprint;
pub mod preview;
pub mod progress;
pub mod relay;

pub use blob::{BlobConfig, BlobStore};
pub use cache::{KvCache, MemoryCache};
pub use catalog::CatalogService;
pub use config::Config;
pub use db::Db;
pub use download::{DownloadPoll, DownloadService, StartOutcome};
pub use preview::{MemoryPreviewStore, PreviewDoc, PreviewStore};
pub use progress::{ProgressTracker, PROGRESS_DONE, PROGRESS_FAILED};
pub use relay::OutboxRelay;
