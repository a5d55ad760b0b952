//! Direct http(s) transport

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use tokio_util::io::StreamReader;
use tracing::{debug, info_span, Instrument};

use super::{ByteStream, Location, SourceHandler};
use crate::core::config::SyncConfig;
use crate::core::error::{Result, SyncError};

/// Stateless GET requests with a bounded read timeout
pub struct HttpHandler {
    client: Client,
    read_timeout: Duration,
}

/// Client with the configured timeouts and user agent
pub(crate) fn build_client(config: &SyncConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .user_agent(&config.user_agent)
        .build()
        .map_err(|e| SyncError::Configuration {
            message: format!("cannot build HTTP client: {}", e),
            suggestion: None,
        })
}

pub(crate) fn request_error(location: &str, read_timeout: Duration, error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::NetworkTimeout {
            location: location.to_string(),
            duration_secs: read_timeout.as_secs(),
        }
    } else {
        SyncError::Transport {
            location: location.to_string(),
            source: error,
        }
    }
}

impl HttpHandler {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            read_timeout: config.read_timeout,
        })
    }

    async fn send(&self, location: &Location) -> Result<Response> {
        let response = self
            .client
            .get(location.as_url().clone())
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| request_error(location.as_url().as_str(), self.read_timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        debug!("{} answered {}", location, status);
        Ok(response)
    }
}

#[async_trait]
impl SourceHandler for HttpHandler {
    fn name(&self) -> &'static str {
        "http"
    }

    fn matches(&self, location: &Location) -> bool {
        matches!(location.scheme(), "http" | "https")
    }

    async fn open(&self, location: &Location) -> Result<ByteStream> {
        let span = info_span!("http_open", location = %location);
        async move {
            let response = self.send(location).await?;
            let body = response.bytes_stream().map_err(std::io::Error::other);
            let stream: ByteStream = Box::new(StreamReader::new(Box::pin(body)));
            Ok(stream)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handler() -> HttpHandler {
        HttpHandler::new(&SyncConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn streams_successful_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pack/mods/a b.jar"))
            .and(header("accept", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let base = Location::parse(&format!("{}/pack/index.toml", server.uri())).unwrap();
        let location = base.join("mods/a b.jar").unwrap();

        let mut stream = handler().open(&location).await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let location = Location::parse(&format!("{}/missing.toml", server.uri())).unwrap();
        match handler().open(&location).await {
            Err(SyncError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("404 must not produce a stream"),
        }
    }

    #[tokio::test]
    async fn slow_servers_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = SyncConfig::default().with_read_timeout(Duration::from_millis(50));
        let handler = HttpHandler::new(&config).unwrap();
        let location = Location::parse(&format!("{}/slow", server.uri())).unwrap();

        let err = handler.open(&location).await.err().unwrap();
        assert_eq!(err.category(), "transport");
    }

    #[tokio::test]
    async fn configured_user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "pack-launcher/2.1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let config = SyncConfig::default().with_user_agent("pack-launcher/2.1");
        let handler = HttpHandler::new(&config).unwrap();
        let location = Location::parse(&format!("{}/pack.toml", server.uri())).unwrap();

        let mut stream = handler.open(&location).await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"ok");
    }

    #[test]
    fn matches_only_http_schemes() {
        let handler = HttpHandler::new(&SyncConfig::default()).unwrap();
        assert!(handler.matches(&Location::parse("https://example.com/a").unwrap()));
        assert!(handler.matches(&Location::parse("http://example.com/a").unwrap()));
        assert!(!handler.matches(&Location::parse("file:///tmp/a").unwrap()));
    }
}
