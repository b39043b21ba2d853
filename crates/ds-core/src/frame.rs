//! The `text/event-stream` wire format.
//!
//! Every message is one self-delimited [`Frame`]: zero or one `event:` line,
//! one or more `data:` lines, and a terminating blank line. The server sends
//! exactly two kinds:
//!
//! ```text
//! event: connected          <- acknowledgement, once, right after validation
//! data: {}
//!
//! data: [{"title":"..."}]   <- one per snapshot
//!
//! ```
//!
//! [`FrameDecoder`] is the incremental inverse used by the client. It accepts
//! arbitrary chunk boundaries, `\n` or `\r\n` line endings, comment lines,
//! and multi-line `data` fields.

use crate::snapshot::Snapshot;

/// Event name of the acknowledgement frame.
pub const CONNECTED_EVENT: &str = "connected";

/// Implicit event name of unnamed frames.
pub const MESSAGE_EVENT: &str = "message";

/// One self-delimited unit of the push stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The `event:` field, if present.
    pub event: Option<String>,

    /// The `data:` lines joined with `\n`.
    pub data: String,
}

impl Frame {
    /// Creates an unnamed frame carrying `data`.
    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// The acknowledgement frame: `event: connected`, `data: {}`.
    #[must_use]
    pub fn connected() -> Self {
        Self {
            event: Some(CONNECTED_EVENT.to_owned()),
            data: "{}".to_owned(),
        }
    }

    /// A data frame carrying the JSON encoding of `snapshot`.
    #[must_use]
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        Self::message(snapshot.to_json())
    }

    /// Returns the event name, defaulting to `message`.
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or(MESSAGE_EVENT)
    }

    /// Returns `true` for frames a message handler should receive.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event_name() == MESSAGE_EVENT
    }

    /// Encodes the frame, terminating blank line included.
    ///
    /// Embedded newlines in `data` become separate `data:` lines so the frame
    /// boundary stays unambiguous.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 16);
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Incremental decoder for a `text/event-stream` byte stream.
///
/// # Examples
///
/// ```
/// use ds_core::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert_eq!(decoder.push(b"event: connected\ndata: {}\n\nda").len(), 1);
/// let frames = decoder.push(b"ta: [1,2]\n\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].data, "[1,2]");
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet terminated by a newline.
    buffer: Vec<u8>,

    /// Event name of the frame under construction.
    event: Option<String>,

    /// Data lines of the frame under construction.
    data: Vec<String>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut start = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.buffer[..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            self.buffer.drain(..=end);
            start = 0;

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Discards any partially received frame.
    ///
    /// Called when the transport is replaced so a half-sent frame from a
    /// dead connection never merges with the next one.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.event = None;
        self.data.clear();
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => tracing::trace!(field, "Ignoring event-stream field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(Frame { event, data })
    }
}
