//! Where a session's bytes go

use std::future::Future;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use super::multipart::StreamHead;
use crate::error::{Result, StreamError};

/// The client end of one stream.
///
/// Any `Err` from `open` or `send` is a `WriteFailed` and ends the session.
pub trait ChunkSink: Send {
    fn open(&mut self, head: StreamHead) -> impl Future<Output = Result<()>> + Send;

    fn send(&mut self, chunk: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Cheap liveness check between frames.
    fn is_connected(&self) -> bool;
}

/// Hands the head and body chunks to an HTTP response being built elsewhere.
pub struct ChannelSink {
    head: Option<oneshot::Sender<StreamHead>>,
    body: flume::Sender<Bytes>,
}

/// Response side of a [`ChannelSink`].
pub struct ChannelReceiver {
    pub head: oneshot::Receiver<StreamHead>,
    pub body: flume::Receiver<Bytes>,
}

/// A bounded session -> response channel; `capacity` chunks may be in flight.
pub fn channel(capacity: usize) -> (ChannelSink, ChannelReceiver) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = flume::bounded(capacity.max(1));
    (
        ChannelSink {
            head: Some(head_tx),
            body: body_tx,
        },
        ChannelReceiver {
            head: head_rx,
            body: body_rx,
        },
    )
}

impl ChunkSink for ChannelSink {
    async fn open(&mut self, head: StreamHead) -> Result<()> {
        let tx = self
            .head
            .take()
            .ok_or_else(|| StreamError::WriteFailed("stream head already sent".into()))?;
        tx.send(head)
            .map_err(|_| StreamError::WriteFailed("client left before the stream head".into()))
    }

    async fn send(&mut self, chunk: Bytes) -> Result<()> {
        self.body
            .send_async(chunk)
            .await
            .map_err(|_| StreamError::WriteFailed("client disconnected".into()))
    }

    fn is_connected(&self) -> bool {
        !self.body.is_disconnected()
    }
}

/// Writes a raw HTTP/1.1 response straight to a socket or any writer.
pub struct WriterSink<W> {
    writer: W,
    connected: bool,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            connected: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let written = async {
            self.writer.write_all(bytes).await?;
            self.writer.flush().await
        }
        .await;

        written.map_err(|e| {
            self.connected = false;
            StreamError::WriteFailed(e.to_string())
        })
    }
}

impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn open(&mut self, head: StreamHead) -> Result<()> {
        self.write(&head.to_http1()).await
    }

    async fn send(&mut self, chunk: Bytes) -> Result<()> {
        self.write(&chunk).await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
