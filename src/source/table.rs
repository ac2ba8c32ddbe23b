//! Paged reader for a PostgREST-style remote table store.
//!
//! Rows are selected with an equality filter on the table's model column
//! (`model`, `provider` or `tone`) and fetched in pages using `Range`
//! headers until an empty page comes back.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::cleaning::Table;
use crate::config::TableSettings;
use crate::error::SourceError;

/// Rows requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Pause between page requests.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Client for the remote table store.
pub struct TableSource {
    base_url: String,
    key: String,
    page_size: usize,
    page_delay: Duration,
    http_client: Client,
}

impl TableSource {
    /// Create a reader for the store at `base_url` authenticated with `key`.
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Result<Self, SourceError> {
        // Store traffic goes direct; only chat-completion calls use a proxy.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .no_proxy()
            .build()
            .map_err(|e| SourceError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            http_client,
        })
    }

    pub fn from_settings(settings: &TableSettings) -> Result<Self, SourceError> {
        Self::new(settings.url.clone(), settings.key.clone())
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Query URL selecting every column of `table` where the model column equals `model`.
    pub fn query_url(&self, table: &Table, model: &str) -> String {
        format!(
            "{}/rest/v1/{}?select=*&{}=eq.{}",
            self.base_url,
            urlencoding::encode(table.name()),
            table.model_column(),
            urlencoding::encode(model)
        )
    }

    /// `Range` header value for the page starting at `offset` (inclusive bounds).
    pub fn range_header(&self, offset: usize) -> String {
        format!("{}-{}", offset, offset + self.page_size - 1)
    }

    /// Fetch every row of `table` belonging to `model`.
    pub async fn fetch(&self, table: &Table, model: &str) -> Result<Vec<Value>, SourceError> {
        let url = self.query_url(table, model);
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(table, &url, offset).await?;
            let fetched = page.len();
            debug!(table = %table, offset = offset, rows = fetched, "Fetched table page");
            if fetched == 0 {
                break;
            }
            rows.extend(page);

            // The store may cap pages below the requested size.
            offset += fetched;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        info!(table = %table, model = model, rows = rows.len(), "Fetched table rows");
        Ok(rows)
    }

    async fn fetch_page(
        &self,
        table: &Table,
        url: &str,
        offset: usize,
    ) -> Result<Vec<Value>, SourceError> {
        let response = self
            .http_client
            .get(url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Range-Unit", "items")
            .header("Range", self.range_header(offset))
            .send()
            .await
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(SourceError::TableStore {
                table: table.name().to_string(),
                code: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::RequestFailed(format!("Failed to parse page: {}", e)))?;

        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(SourceError::UnexpectedRow {
                table: table.name().to_string(),
                message: format!("expected a JSON array page, got {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn source() -> TableSource {
        TableSource::new("https://example.supabase.co/", "anon-key").expect("client builds")
    }

    #[test]
    fn test_query_url_uses_model_column() {
        let source = source();
        assert_eq!(
            source.query_url(&Table::Results, "openai"),
            "https://example.supabase.co/rest/v1/results?select=*&provider=eq.openai"
        );
        assert_eq!(
            source.query_url(&Table::InteractionsNew, "precise-gpt-4"),
            "https://example.supabase.co/rest/v1/interactions_new?select=*&tone=eq.precise-gpt-4"
        );
        assert_eq!(
            source.query_url(&Table::Dataset, "gpt 4"),
            "https://example.supabase.co/rest/v1/dataset?select=*&model=eq.gpt%204"
        );
    }

    #[test]
    fn test_range_header() {
        let source = source();
        assert_eq!(source.range_header(0), "0-999");
        assert_eq!(source.range_header(1000), "1000-1999");

        let small = source.with_page_size(10);
        assert_eq!(small.range_header(20), "20-29");
    }

    #[test]
    fn test_page_size_never_zero() {
        assert_eq!(source().with_page_size(0).range_header(0), "0-0");
    }

    /// Serves `total` JSON rows, never more than `cap` per response, and
    /// records every `Range` header it sees.
    fn spawn_capped_store(total: usize, cap: usize) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ranges);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request).to_string();
                let range = request
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower.strip_prefix("range:").map(|v| v.trim().to_string())
                    })
                    .unwrap_or_default();
                seen.lock().expect("lock").push(range.clone());

                let (start, end) = range.split_once('-').expect("range header");
                let start: usize = start.parse().expect("range start");
                let end: usize = end.parse().expect("range end");
                let rows: Vec<serde_json::Value> = (start..=end)
                    .take(cap)
                    .take_while(|i| *i < total)
                    .map(|i| serde_json::json!({ "id": i }))
                    .collect();

                let body = serde_json::to_string(&rows).expect("serialize rows");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        (format!("http://{}", addr), ranges)
    }

    #[tokio::test]
    async fn test_fetch_continues_past_capped_pages() {
        let (base_url, ranges) = spawn_capped_store(5, 2);
        let source = TableSource::new(base_url, "anon-key")
            .expect("client builds")
            .with_page_size(3)
            .with_page_delay(Duration::ZERO);

        let rows = source.fetch(&Table::Dataset, "gpt-4").await.expect("fetch succeeds");

        let ids: Vec<u64> = rows.iter().filter_map(|r| r["id"].as_u64()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            *ranges.lock().expect("lock"),
            vec!["0-2", "2-4", "4-6", "5-7"]
        );
    }
}
