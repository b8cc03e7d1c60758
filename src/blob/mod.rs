//! Blob store adapter - S3-compatible object storage (MinIO, R2)
//!
//! Organized into submodules:
//! - `types`: config and client creation
//! - `presigned`: presigned GET/PUT and part-upload URLs
//! - `objects`: streaming reads, deletes, listing
//! - `upload`: multipart primitives and the chunked streaming PUT

mod objects;
mod presigned;
mod types;
mod upload;

pub use types::{BlobConfig, BlobResult, BlobStore};
pub use upload::stream_put;
