//! Serializes events onto an outward text stream.
//!
//! Frames use server-sent-events framing: `data: <json>` followed by a blank
//! line. The stream always ends with the `data: [DONE]` sentinel.

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use crate::domain::Event;

/// Literal payload of the end-of-stream frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Encode one event as a self-delimiting frame
pub fn encode_frame(event: &Event) -> Result<String> {
    if event.is_done() {
        return Ok(format!("data: {}\n\n", DONE_SENTINEL));
    }

    let json = serde_json::to_string(event)
        .with_context(|| format!("Failed to encode {} event", event.kind()))?;
    Ok(format!("data: {}\n\n", json))
}

/// Split a buffered stream back into frame payloads (JSON text or the sentinel)
pub fn split_frames(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .collect()
}

/// Writes frames to any async sink (stdout, a socket, a buffer)
pub struct StreamPublisher<W> {
    writer: W,
    frames_written: usize,
}

impl<W: AsyncWrite + Unpin> StreamPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
        }
    }

    /// Publish every event in arrival order, then the end-of-stream marker.
    ///
    /// Stops at the first `Done` event. If the source ends without one, the
    /// marker is written anyway. Returns the number of frames written.
    pub async fn publish<S>(&mut self, events: S) -> Result<usize>
    where
        S: Stream<Item = Event> + Unpin,
    {
        let mut events = events;
        while let Some(event) = events.next().await {
            let done = event.is_done();
            self.write_frame(&event).await?;
            if done {
                return Ok(self.frames_written);
            }
        }

        debug!("Event source ended without a terminal marker");
        self.write_frame(&Event::Done).await?;
        Ok(self.frames_written)
    }

    async fn write_frame(&mut self, event: &Event) -> Result<()> {
        let frame = encode_frame(event)?;
        self.writer
            .write_all(frame.as_bytes())
            .await
            .context("Failed to write stream frame")?;
        self.writer.flush().await.context("Failed to flush stream")?;
        self.frames_written += 1;
        Ok(())
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}
