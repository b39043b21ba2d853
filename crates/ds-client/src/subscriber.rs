//! The reconnecting subscriber.
//!
//! [`subscribe`] spawns one task per subscription. The task walks the
//! [`SubscriberState`] machine: it opens the transport, feeds decoded
//! `message` frames through the caller's transform into the caller's sink,
//! and on any transport failure waits out the next backoff delay before
//! reconnecting. A successful open resets the backoff.
//!
//! A malformed frame, or one the transform rejects, is logged and dropped.
//! It never closes the connection.
//!
//! The returned [`Subscription`] is the disposer. Closing it (or dropping
//! it) cancels the task wherever it is, including mid-backoff, and no sink
//! update happens after `close` returns. [`Subscription::closed`] resolves
//! only once the task has stopped and its connection has been dropped.

use std::fmt::Display;
use std::sync::Arc;

use ds_core::{Frame, FrameDecoder, RetryConfig};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{ClientError, TransportError};
use crate::retry::RetryState;
use crate::sink::SnapshotSink;
use crate::state::SubscriberState;
use crate::transport::{ByteStream, Transport};

/// Default tag recorded on every log line of a subscription.
pub const DEFAULT_LOG_PREFIX: &str = "SSE";

/// What to subscribe to and how hard to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// The stream endpoint, without the `data_source` parameter.
    pub endpoint: Url,
    /// Value sent as the `data_source` query parameter.
    pub data_source: String,
    /// Backoff policy.
    pub retry: RetryConfig,
    /// Tag recorded on every log line of the subscription.
    pub log_prefix: String,
}

impl SubscribeOptions {
    /// Creates options with the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `endpoint` is not an
    /// absolute `http` or `https` URL.
    pub fn new(endpoint: &str, data_source: impl Into<String>) -> Result<Self, ClientError> {
        let url = Url::parse(endpoint).map_err(|err| ClientError::invalid_endpoint(endpoint, err))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::invalid_endpoint(
                endpoint,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(Self {
            endpoint: url,
            data_source: data_source.into(),
            retry: RetryConfig::default(),
            log_prefix: DEFAULT_LOG_PREFIX.to_owned(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the log prefix.
    #[must_use]
    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    /// The full request URL, `data_source` included.
    #[must_use]
    pub fn stream_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("data_source", &self.data_source);
        url
    }
}

/// Subscribes to a data source.
///
/// Each `message` frame is decoded as JSON, passed to `transform`, and the
/// result published to `sink`. Must be called within a Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use ds_client::{subscribe, HttpTransport, SubscribeOptions};
/// use serde_json::Value;
/// use tokio::sync::watch;
///
/// # async fn example() -> Result<(), ds_client::ClientError> {
/// let options = SubscribeOptions::new("http://127.0.0.1:5173/api/data-stream", "static/data/reels.json")?;
/// let (sink, mut records) = watch::channel(Value::Null);
///
/// let subscription = subscribe(options, Ok::<_, String>, sink, HttpTransport::new()?);
/// records.changed().await.ok();
/// println!("{}", *records.borrow());
///
/// subscription.close();
/// # Ok(())
/// # }
/// ```
pub fn subscribe<T, E, F, S, X>(
    options: SubscribeOptions,
    transform: F,
    sink: S,
    transport: X,
) -> Subscription
where
    F: Fn(Value) -> Result<T, E> + Send + 'static,
    E: Display,
    S: SnapshotSink<T>,
    X: Transport,
{
    let token = CancellationToken::new();
    let state = Arc::new(watch::Sender::new(SubscriberState::Idle));
    let span = tracing::info_span!(
        "subscription",
        prefix = %options.log_prefix,
        source = %options.data_source,
    );

    // Held while publishing; `close` takes it to cancel, so a publish is
    // either finished before `close` returns or never happens.
    let publish_lock = Arc::new(Mutex::new(()));

    let deliver = {
        let token = token.clone();
        let publish_lock = Arc::clone(&publish_lock);
        move |value: Value| -> Result<bool, String> {
            let item = transform(value).map_err(|err| err.to_string())?;
            let _guard = publish_lock.lock();
            if token.is_cancelled() {
                return Ok(false);
            }
            sink.publish(item);
            Ok(true)
        }
    };

    let subscriber = Subscriber {
        url: options.stream_url(),
        retry: RetryState::from_config(&options.retry),
        decoder: FrameDecoder::new(),
        deliver: Box::new(deliver),
        transport,
        state: Arc::clone(&state),
        token: token.clone(),
    };
    let handle = tokio::spawn(subscriber.run().instrument(span));

    Subscription {
        token,
        abort: handle.abort_handle(),
        task: tokio::sync::Mutex::new(Some(handle)),
        publish_lock,
        state,
        max_attempts: options.retry.max_attempts,
    }
}

/// Transforms and publishes one decoded value. `Ok(false)` means the
/// subscription closed before the value could be published.
type Deliver = Box<dyn FnMut(Value) -> Result<bool, String> + Send>;

/// The task side of a subscription.
struct Subscriber<X> {
    url: Url,
    retry: RetryState,
    decoder: FrameDecoder,
    deliver: Deliver,
    transport: X,
    state: Arc<watch::Sender<SubscriberState>>,
    token: CancellationToken,
}

impl<X: Transport> Subscriber<X> {
    async fn run(mut self) {
        let token = self.token.clone();

        let outcome = loop {
            self.transition(SubscriberState::Connecting);
            tracing::debug!(url = %self.url, "Connecting");

            let opened = tokio::select! {
                biased;
                () = token.cancelled() => break SubscriberState::Closed,
                opened = self.transport.open(&self.url) => opened,
            };

            let failure = match opened {
                Ok(stream) => {
                    self.retry.reset();
                    self.transition(SubscriberState::Open);
                    tracing::info!("Connection opened");

                    tokio::select! {
                        biased;
                        () = token.cancelled() => break SubscriberState::Closed,
                        failure = self.pump(stream) => failure,
                    }
                }
                Err(err) => err,
            };

            self.transition(SubscriberState::Erroring);
            tracing::warn!(error = %failure, "Connection failed");

            let Some(delay) = self.retry.next_delay() else {
                tracing::error!(
                    attempts = self.retry.attempt_count(),
                    "Retry budget exhausted, giving up"
                );
                break SubscriberState::Exhausted;
            };

            self.transition(SubscriberState::RetryWait);
            tracing::info!(
                attempt = self.retry.attempt_count(),
                max_attempts = self.retry.max_attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting after delay"
            );

            tokio::select! {
                biased;
                () = token.cancelled() => break SubscriberState::Closed,
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.transition(outcome);
    }

    /// Reads `stream` until it fails or ends. The stream is dropped on return.
    async fn pump(&mut self, mut stream: ByteStream) -> TransportError {
        self.decoder.reset();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in self.decoder.push(&bytes) {
                        self.handle_frame(frame);
                    }
                }
                Err(err) => return err,
            }
        }
        TransportError::Closed
    }

    fn handle_frame(&mut self, frame: Frame) {
        if !frame.is_message() {
            tracing::debug!(event = frame.event_name(), "Ignoring named event");
            return;
        }
        if self.token.is_cancelled() {
            return;
        }

        let value: Value = match serde_json::from_str(&frame.data) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "Discarding malformed frame");
                return;
            }
        };
        match (self.deliver)(value) {
            Ok(true) => tracing::debug!("Delivered snapshot"),
            Ok(false) => tracing::debug!("Subscription closed, snapshot dropped"),
            Err(err) => tracing::warn!(error = %err, "Discarding frame rejected by transform"),
        }
    }

    /// Moves to `next` unless the subscription already reached a terminal state.
    fn transition(&self, next: SubscriberState) {
        self.state.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            tracing::trace!(from = %current, to = %next, "State change");
            *current = next;
            true
        });
    }
}

/// Handle to a running subscription. Closing or dropping it stops the
/// subscription.
pub struct Subscription {
    token: CancellationToken,
    abort: AbortHandle,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    publish_lock: Arc<Mutex<()>>,
    state: Arc<watch::Sender<SubscriberState>>,
    max_attempts: u32,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &self.state())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Closes the connection and cancels any pending reconnect.
    ///
    /// Safe to call from any state and any number of times. Once this
    /// returns the sink receives no further updates and the state no longer
    /// changes. Await [`closed`](Self::closed) to know the connection itself
    /// has been released.
    pub fn close(&self) {
        {
            let _guard = self.publish_lock.lock();
            self.token.cancel();
        }
        self.abort.abort();
        if self.mark_closed() {
            tracing::info!("Subscription closed");
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    /// Waits for the subscription task to finish and returns the final state.
    ///
    /// The task's connection, timers, and transform have all been dropped
    /// by the time this resolves.
    pub async fn closed(&self) -> SubscriberState {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_mut() {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_panic() => {
                    tracing::error!(error = %err, "Subscription task panicked");
                }
                Err(_) => tracing::trace!("Subscription task aborted"),
            }
            *task = None;
        }
        self.mark_closed();
        self.state()
    }

    /// Waits for the subscription to end.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Exhausted`] if it ended because every
    /// reconnect failed.
    pub async fn wait(&self) -> Result<(), ClientError> {
        match self.closed().await {
            SubscriberState::Exhausted => Err(ClientError::Exhausted {
                attempts: self.max_attempts,
            }),
            _ => Ok(()),
        }
    }

    /// Moves to [`SubscriberState::Closed`] unless already terminal.
    fn mark_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = SubscriberState::Closed;
            true
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
