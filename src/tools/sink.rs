//! Where finished records go.

use crate::core::error::SinkError;
use crate::core::types::ProductRecord;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

#[async_trait]
pub trait RecordSink: Send {
    async fn write(&mut self, record: &ProductRecord) -> Result<(), SinkError>;

    async fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// In-memory sink, mostly for tests and embedding.
#[async_trait]
impl RecordSink for Vec<ProductRecord> {
    async fn write(&mut self, record: &ProductRecord) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}

/// One JSON object per line, flushed after every record so an interrupted run
/// keeps everything written so far.
pub struct JsonLinesSink {
    out: Box<dyn AsyncWrite + Send + Unpin>,
    written: usize,
}

impl JsonLinesSink {
    pub fn new(out: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self { out, written: 0 }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Append to `path`, creating it (and its parent directory) if needed.
    pub async fn append(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!("writing records to {}", path.display());
        Ok(Self::new(Box::new(file)))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write(&mut self, record: &ProductRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.out.write_all(&line).await?;
        self.out.flush().await?;
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ListingStub, PageContext, SearchQuery};
    use std::sync::Arc;

    fn record() -> ProductRecord {
        let stub = ListingStub {
            item_url: "https://shop.test/itm/7".to_string(),
            title_hint: None,
            price_hint: None,
            context: Arc::new(PageContext {
                search_url: "https://shop.test/s?q=widget".to_string(),
                page_number: 1,
                query: Arc::new(SearchQuery {
                    search_term: "widget".to_string(),
                    category_id: None,
                    category_name: None,
                    source_keyword: "widget".to_string(),
                    search_url: "https://shop.test/s?q=widget".to_string(),
                }),
            }),
        };
        let mut r = ProductRecord::from_stub(&stub, &stub.item_url);
        r.title = Some("Widget".to_string());
        r
    }

    #[tokio::test]
    async fn test_json_lines_file() {
        let path = std::env::temp_dir()
            .join(format!("listing-scout-{}", uuid::Uuid::new_v4()))
            .join("out.jsonl");
        let mut sink = JsonLinesSink::append(&path).await.unwrap();
        sink.write(&record()).await.unwrap();
        sink.write(&record()).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.written(), 2);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ProductRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Widget"));
        assert_eq!(parsed.source_keyword, "widget");
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn test_vec_sink() {
        let mut sink: Vec<ProductRecord> = Vec::new();
        tokio_test::assert_ok!(sink.write(&record()).await);
        assert_eq!(sink.len(), 1);
    }
}
