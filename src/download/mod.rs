//! Paid-download delivery pipeline
//!
//! Streams a dataset from the permanent bucket to a temporary buyer-specific
//! copy while embedding the purchase watermark, without buffering the object:
//! - a producer reads lines, watermarks them, and feeds a single-slot handoff
//! - an uploader drains the handoff into a chunked PUT against a presigned
//!   temporary-bucket URL
//! - progress is observable throughout; 100 is written only once the
//!   destination write is confirmed

mod service;
mod types;
mod worker;

pub use service::DownloadService;
pub use types::{DownloadPoll, StartOutcome};
