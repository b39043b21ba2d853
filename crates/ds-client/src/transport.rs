//! Opening the byte stream behind a subscription.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{StatusCode, Url};

use crate::error::TransportError;

/// Raw body chunks of an open stream. Chunk boundaries carry no meaning.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Opens event streams.
///
/// A successful `open` means the server accepted the subscription; the
/// returned stream then yields body bytes until the connection ends.
/// Dropping the stream closes the connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a stream for `url`.
    async fn open(&self, url: &Url) -> Result<ByteStream, TransportError>;
}

/// [`Transport`] over HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a connect timeout and no overall timeout,
    /// since streams are long-lived.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend fails to
    /// initialize.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("datastream/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &Url) -> Result<ByteStream, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(TransportError::ContentType(content_type.to_owned()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed())
    }
}
