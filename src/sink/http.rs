//! HTTP sink: ships batches of CLEF records as newline-delimited JSON
//! (JSONL) via HTTP POST, on top of the batch-and-retry engine.

use std::time::Duration;

use crate::entry::LogEntry;
use crate::error::BatchError;
use crate::format::{CompactJsonFormatter, Formatter};

use super::batched::{BatchDelivery, BatchOptions, BatchedSink};

/// Endpoint and batching configuration for [`HttpSink`].
#[derive(Debug, Clone)]
pub struct HttpSinkOptions {
    pub url: String,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: u64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: usize,
    pub max_queue_size: usize,
}

impl HttpSinkOptions {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSinkOptions {
            url: url.into(),
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            timeout_ms: 10_000,
            batch_size: 50,
            flush_interval_ms: 5000,
            max_retries: 3,
            max_queue_size: 10_000,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = ct.into();
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn max_queue_size(mut self, n: usize) -> Self {
        self.max_queue_size = n;
        self
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions::new()
            .batch_size(self.batch_size)
            .flush_interval_ms(self.flush_interval_ms)
            .max_retries(self.max_retries)
            .max_queue_size(self.max_queue_size)
    }
}

/// Batch shipper POSTing JSONL bodies with a blocking HTTP client.
pub struct HttpDelivery {
    opts: HttpSinkOptions,
    formatter: CompactJsonFormatter,
    agent: ureq::Agent,
}

impl HttpDelivery {
    fn new(opts: HttpSinkOptions) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .build();
        HttpDelivery {
            opts,
            formatter: CompactJsonFormatter::new(),
            agent,
        }
    }

    fn format_body(&self, batch: &[LogEntry]) -> String {
        let mut body = String::with_capacity(batch.len() * 256);
        for (i, entry) in batch.iter().enumerate() {
            if i > 0 {
                body.push('\n');
            }
            body.push_str(&self.formatter.format(entry));
        }
        body
    }
}

impl BatchDelivery for HttpDelivery {
    fn write_batch(&self, batch: &[LogEntry]) -> Result<(), BatchError> {
        let body = self.format_body(batch);
        if body.is_empty() {
            return Ok(());
        }

        let mut request = self
            .agent
            .post(&self.opts.url)
            .set("Content-Type", &self.opts.content_type);
        for (key, value) in &self.opts.headers {
            request = request.set(key, value);
        }

        match request.send_string(&body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(BatchError::new(format!(
                "HTTP POST to {} returned status {}",
                self.opts.url, code
            ))),
            Err(err) => Err(BatchError::new(format!(
                "HTTP POST to {} failed: {}",
                self.opts.url, err
            ))),
        }
    }

    fn on_batch_error(&self, error: &BatchError, attempt: usize) {
        eprintln!("lunar-log: http sink batch error (retry {}): {}", attempt, error);
    }
}

/// HTTP delivery sink. Body format: one CLEF-compact JSON record per
/// line.
pub type HttpSink = BatchedSink<HttpDelivery>;

impl HttpSink {
    pub fn http(opts: HttpSinkOptions) -> Self {
        let batch_opts = opts.batch_options();
        BatchedSink::with_options(batch_opts, HttpDelivery::new(opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;

    #[test]
    fn test_jsonl_body_layout() {
        let delivery = HttpDelivery::new(HttpSinkOptions::new("http://localhost:1/logs"));
        let batch = vec![
            LogEntry::new(LogLevel::Info, "one"),
            LogEntry::new(LogLevel::Warn, "two"),
        ];
        let body = delivery.format_body(&batch);
        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("@t").is_some());
        }
    }

    #[test]
    fn test_unreachable_endpoint_is_batch_error() {
        let delivery = HttpDelivery::new(
            HttpSinkOptions::new("http://127.0.0.1:1/logs").timeout_ms(200),
        );
        let batch = vec![LogEntry::new(LogLevel::Info, "x")];
        assert!(delivery.write_batch(&batch).is_err());
    }
}
