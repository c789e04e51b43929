use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::ingest::source::{FeedConnection, FeedSource};

/// Feed source over a streaming HTTP endpoint delivering line-delimited
/// JSON. Blank lines are keep-alive heartbeats and are skipped.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpFeedSource {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let url = Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                endpoint
            )));
        }

        // Long read timeout: the feed holds the response open indefinitely
        // and may stay silent between items apart from keep-alives.
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        debug!(endpoint = %self.endpoint, "connecting to feed");

        let mut request = self.client.get(&self.endpoint);
        if let Some(token) = &self.bearer_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "HTTP {} from feed endpoint {}",
                response.status().as_u16(),
                self.endpoint
            )));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(Box::new(HttpFeedConnection {
            chunks,
            buffer: Vec::new(),
            open: true,
        }))
    }
}

struct HttpFeedConnection {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    open: bool,
}

impl HttpFeedConnection {
    /// Take the next complete line out of the buffer, if one is there.
    fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Flush whatever trails the last newline once the stream ends.
    fn drain_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

#[async_trait]
impl FeedConnection for HttpFeedConnection {
    async fn receive(&mut self) -> Result<Option<String>> {
        loop {
            if !self.open {
                return Ok(None);
            }

            while let Some(line) = self.next_line() {
                if line.is_empty() {
                    debug!("feed keep-alive");
                    continue;
                }
                return Ok(Some(line));
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.open = false;
                    return Err(e.into());
                }
                None => {
                    self.open = false;
                    return Ok(self.drain_remainder());
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STREAM_BODY: &str = concat!(
        r#"{"id": 1, "text": "first", "user": {"id": 10, "screen_name": "a"}}"#,
        "\n",
        "\r\n",
        r#"{"id": 2, "text": "second", "user": {"id": 20, "screen_name": "b"}}"#,
        "\n",
    );

    #[tokio::test]
    async fn test_receive_splits_lines_and_skips_keepalives() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(STREAM_BODY)
                    .insert_header("content-type", "application/json"),
            )
            .mount(&mock_server)
            .await;

        let source = HttpFeedSource::new(format!("{}/stream", mock_server.uri())).unwrap();
        let mut conn = source.connect().await.unwrap();

        let first = conn.receive().await.unwrap().unwrap();
        assert!(first.contains(r#""id": 1"#));
        let second = conn.receive().await.unwrap().unwrap();
        assert!(second.contains(r#""id": 2"#));

        // Orderly end of stream.
        assert!(conn.receive().await.unwrap().is_none());
        assert!(conn.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_delivered() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": 3, "text": "tail", "user": {"id": 30, "screen_name": "c"}}"#,
            ))
            .mount(&mock_server)
            .await;

        let source = HttpFeedSource::new(format!("{}/stream", mock_server.uri())).unwrap();
        let mut conn = source.connect().await.unwrap();

        let item = conn.receive().await.unwrap().unwrap();
        assert!(item.contains(r#""id": 3"#));
        assert!(conn.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_rejects_http_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let source = HttpFeedSource::new(format!("{}/stream", mock_server.uri())).unwrap();
        match source.connect().await {
            Err(Error::Transport(msg)) => assert!(msg.contains("401")),
            other => panic!("expected Transport error, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_shutdown_ends_delivery() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STREAM_BODY))
            .mount(&mock_server)
            .await;

        let source = HttpFeedSource::new(format!("{}/stream", mock_server.uri())).unwrap();
        let mut conn = source.connect().await.unwrap();

        conn.shutdown().await;
        assert!(conn.receive().await.unwrap().is_none());
    }

    #[test]
    fn test_invalid_endpoint_schemes() {
        for endpoint in ["ftp://example.com/stream", "not a url"] {
            assert!(matches!(
                HttpFeedSource::new(endpoint),
                Err(Error::InvalidUrl(_))
            ));
        }
    }
}
