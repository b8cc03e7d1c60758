//! Preview document store seam
//!
//! The preview collection (first rows of a dataset shown before purchase)
//! lives in a document store. Only the three operations the engine needs are
//! specified here; the in-memory implementation backs tests and
//! single-process deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub type PreviewResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Preview document, keyed by the dataset's object name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewDoc {
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
    #[serde(rename = "previewData")]
    pub preview_data: Vec<serde_json::Value>,
}

#[async_trait]
pub trait PreviewStore: Send + Sync {
    async fn insert_preview(&self, doc: PreviewDoc) -> PreviewResult<()>;

    async fn preview(&self, object_name: &str) -> PreviewResult<Option<PreviewDoc>>;

    /// Delete by key. Deleting an absent document succeeds, so outbox
    /// retries stay idempotent.
    async fn delete_preview(&self, object_name: &str) -> PreviewResult<()>;
}

#[derive(Default)]
pub struct MemoryPreviewStore {
    docs: Mutex<HashMap<String, PreviewDoc>>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreviewStore for MemoryPreviewStore {
    async fn insert_preview(&self, doc: PreviewDoc) -> PreviewResult<()> {
        let mut docs = self.docs.lock().await;
        docs.insert(doc.object_name.clone(), doc);
        Ok(())
    }

    async fn preview(&self, object_name: &str) -> PreviewResult<Option<PreviewDoc>> {
        let docs = self.docs.lock().await;
        Ok(docs.get(object_name).cloned())
    }

    async fn delete_preview(&self, object_name: &str) -> PreviewResult<()> {
        let mut docs = self.docs.lock().await;
        docs.remove(object_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> PreviewDoc {
        PreviewDoc {
            object_name: name.to_string(),
            file_size: 1024,
            preview_data: vec![serde_json::json!({"id": 1, "text": "alpha"})],
        }
    }

    #[tokio::test]
    async fn insert_find_delete_round_trip() {
        let store = MemoryPreviewStore::new();
        store.insert_preview(doc("a.jsonl")).await.unwrap();

        let found = store.preview("a.jsonl").await.unwrap().unwrap();
        assert_eq!(found.file_size, 1024);

        store.delete_preview("a.jsonl").await.unwrap();
        assert!(store.preview("a.jsonl").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_absent_preview_is_not_an_error() {
        let store = MemoryPreviewStore::new();
        store.delete_preview("missing.jsonl").await.unwrap();
    }
}
