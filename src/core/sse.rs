//! Server-sent events response channel.
//!
//! A handler creates an [`SseChannel`], keeps one [`SseSender`] for itself and
//! returns the channel as its response. The dispatcher turns the channel into an
//! [`SseStream`] that becomes the `text/event-stream` body. When the transport
//! drops that body (client went away, server shutting down) the channel moves
//! `Open -> Closing`, runs the registered close callback once, then settles in
//! `Closed`. Sends after that point fail with [`SseError::Closed`].
use std::{
    convert::Infallible,
    fmt,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::error::HandlerError;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closing,
    Closed,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SseError {
    #[error("event stream is closed")]
    Closed,

    #[error("event name must not contain line breaks: {0:?}")]
    InvalidEventName(String),

    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<SseError> for HandlerError {
    fn from(error: SseError) -> Self {
        HandlerError::Internal(eyre::Report::new(error))
    }
}

struct Shared {
    state: AtomicU8,
    on_close: Mutex<Option<CloseCallback>>,
}

impl Shared {
    fn state(&self) -> ChannelState {
        match self.state.load(Ordering::Acquire) {
            OPEN => ChannelState::Open,
            CLOSING => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    fn set_callback(&self, callback: CloseCallback) {
        match self.on_close.lock() {
            Ok(mut slot) => *slot = Some(callback),
            Err(e) => tracing::warn!("SSE close callback lock poisoned: {}", e),
        }
    }

    fn close(&self) {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let callback = self.on_close.lock().ok().and_then(|mut slot| slot.take());
        if let Some(callback) = callback {
            callback();
        }

        self.state.store(CLOSED, Ordering::Release);
        tracing::debug!("SSE channel closed");
    }
}

/// A push-only event stream returned by a handler.
pub struct SseChannel {
    sender: SseSender,
    receiver: Option<mpsc::UnboundedReceiver<Bytes>>,
}

impl SseChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: SseSender {
                tx,
                shared: Arc::new(Shared {
                    state: AtomicU8::new(OPEN),
                    on_close: Mutex::new(None),
                }),
            },
            receiver: Some(rx),
        }
    }

    /// Create a channel with its close callback already registered.
    pub fn with_close_callback(callback: impl FnOnce() + Send + 'static) -> Self {
        let channel = Self::new();
        channel.on_close(callback);
        channel
    }

    /// Register (or replace) the callback run when the client disconnects.
    pub fn on_close(&self, callback: impl FnOnce() + Send + 'static) {
        self.sender.on_close(callback);
    }

    /// A producer handle. Events are delivered in the order they are sent.
    pub fn sender(&self) -> SseSender {
        self.sender.clone()
    }

    pub fn state(&self) -> ChannelState {
        self.sender.state()
    }

    /// Consume the channel, yielding the body stream handed to the transport.
    pub fn into_stream(mut self) -> SseStream {
        let receiver = self.receiver.take().unwrap_or_else(|| {
            // Only reachable through a double conversion; hand out a finished stream.
            let (_, rx) = mpsc::unbounded_channel();
            rx
        });
        SseStream {
            inner: UnboundedReceiverStream::new(receiver),
            shared: self.sender.shared.clone(),
        }
    }
}

impl Default for SseChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseChannel")
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for SseChannel {
    fn drop(&mut self) {
        // Never attached to a response: nobody will ever read it.
        if self.receiver.is_some() {
            self.sender.shared.close();
        }
    }
}

/// Producer side of an [`SseChannel`].
#[derive(Clone)]
pub struct SseSender {
    tx: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl SseSender {
    /// Push one event. The payload is JSON encoded on a single `data:` line.
    pub fn send<T>(&self, data: &T, event: Option<&str>) -> Result<(), SseError>
    where
        T: Serialize + ?Sized,
    {
        if let Some(name) = event {
            if name.contains(['\n', '\r']) {
                return Err(SseError::InvalidEventName(name.to_string()));
            }
        }
        let frame = format_event(&serde_json::to_string(data)?, event);
        self.push(frame)
    }

    /// Push a comment line, typically used as a keep-alive.
    pub fn send_comment(&self, text: &str) -> Result<(), SseError> {
        let mut frame = String::new();
        for line in text.lines() {
            frame.push_str(": ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        self.push(frame)
    }

    pub fn on_close(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.set_callback(Box::new(callback));
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() != ChannelState::Open
    }

    /// Resolves once the consumer side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    fn push(&self, frame: String) -> Result<(), SseError> {
        if self.is_closed() {
            return Err(SseError::Closed);
        }
        self.tx
            .send(Bytes::from(frame))
            .map_err(|_| SseError::Closed)
    }
}

impl fmt::Debug for SseSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseSender")
            .field("state", &self.state())
            .finish()
    }
}

/// Body stream of an event channel. Dropping it closes the channel.
pub struct SseStream {
    inner: UnboundedReceiverStream<Bytes>,
    shared: Arc<Shared>,
}

impl Stream for SseStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// `[event: <name>\n]data: <json>\n\n`
pub fn format_event(json: &str, event: Option<&str>) -> String {
    match event {
        Some(name) => format!("event: {name}\ndata: {json}\n\n"),
        None => format!("data: {json}\n\n"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures_util::StreamExt;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_named_event_framing() {
        let channel = SseChannel::new();
        let sender = channel.sender();
        let mut stream = channel.into_stream();

        sender.send(&json!({"count": 0}), Some("event_name")).unwrap();
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"event: event_name\ndata: {\"count\":0}\n\n");
    }

    #[tokio::test]
    async fn test_unnamed_event_and_order() {
        let channel = SseChannel::new();
        let sender = channel.sender();
        let mut stream = channel.into_stream();

        for i in 0..3 {
            sender.send(&i, None).unwrap();
        }
        for i in 0..3 {
            let frame = stream.next().await.unwrap().unwrap();
            assert_eq!(frame, Bytes::from(format!("data: {i}\n\n")));
        }
    }

    #[tokio::test]
    async fn test_drop_runs_close_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let channel = SseChannel::with_close_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let sender = channel.sender();
        let stream = channel.into_stream();

        assert_eq!(sender.state(), ChannelState::Open);
        drop(stream);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sender.state(), ChannelState::Closed);
        assert!(matches!(sender.send(&1, None), Err(SseError::Closed)));
        sender.closed().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unused_channel_still_closes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let channel = SseChannel::new();
        channel.on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(channel);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_name_with_newline_rejected() {
        let channel = SseChannel::new();
        let err = channel.sender().send(&1, Some("a\nb")).unwrap_err();
        assert!(matches!(err, SseError::InvalidEventName(_)));
    }

    #[tokio::test]
    async fn test_comment_frame() {
        let channel = SseChannel::new();
        let sender = channel.sender();
        let mut stream = channel.into_stream();
        sender.send_comment("keep-alive").unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Bytes::from_static(b": keep-alive\n\n")
        );
    }
}
