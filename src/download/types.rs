//! Download job result types

use crate::progress::{PROGRESS_DONE, PROGRESS_FAILED};
use serde::Serialize;

/// Outcome of starting a paid download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A result URL is already cached for this (buyer, dataset); nothing ran.
    Ready(String),
    /// The pipeline was dispatched; poll with this temporary object name.
    Started(String),
}

/// One poll of an in-flight download job.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadPoll {
    /// 0..=100, or [`PROGRESS_FAILED`] for a terminally failed job
    pub progress: i64,
    /// Populated only once progress reaches 100
    pub url: Option<String>,
}

impl DownloadPoll {
    pub fn is_complete(&self) -> bool {
        self.progress == PROGRESS_DONE
    }

    pub fn is_failed(&self) -> bool {
        self.progress == PROGRESS_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_state_predicates() {
        let running = DownloadPoll {
            progress: 42,
            url: None,
        };
        assert!(!running.is_complete() && !running.is_failed());

        let done = DownloadPoll {
            progress: 100,
            url: Some("https://example.com/tmp/x".to_string()),
        };
        assert!(done.is_complete());

        let failed = DownloadPoll {
            progress: -1,
            url: None,
        };
        assert!(failed.is_failed());
    }
}
