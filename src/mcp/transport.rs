//! Stream transport for the tool control protocol.
//!
//! This module normalises two different byte-stream shapes behind one
//! read/write contract:
//!
//! - **Pipe** streams (stdin/stdout or any `AsyncRead`/`AsyncWrite` pair):
//!   bytes arrive incrementally and are buffered until a newline is seen
//! - **Channel** streams (in-process `mpsc` byte channels): each delivered
//!   message is already one newline-delimited frame
//!
//! The variant is selected once at construction; nothing is probed at
//! read time. stdin receives commands, stdout sends responses, stderr may
//! be used for logging (never protocol traffic).
//!
//! Best-effort framing: if the underlying source closes before a newline
//! is seen, the remaining partial bytes are returned once as a line, then
//! end-of-stream is reported.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::mcp::protocol::ResponseEnvelope;

/// The reading half of a transport.
enum StreamReader {
    /// Buffered incremental byte delivery; lines are reassembled here.
    Pipe(BufReader<Box<dyn AsyncRead + Send + Sync + Unpin>>),
    /// Discrete whole-message delivery; no reassembly needed.
    Channel(mpsc::Receiver<Vec<u8>>),
}

/// The writing half of a transport.
enum StreamWriter {
    /// Incremental byte sink with explicit flushing.
    Pipe(Box<dyn AsyncWrite + Send + Sync + Unpin>),
    /// Discrete whole-message sink. `None` once closed.
    Channel(Option<mpsc::Sender<Vec<u8>>>),
}

/// A bidirectional protocol transport.
///
/// Owns one reader and one writer, each independently pipe- or
/// channel-backed.
pub struct Transport {
    reader: StreamReader,
    writer: StreamWriter,
}

impl Transport {
    /// Creates a transport over the process stdio streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::from_pipe(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Creates a pipe-backed transport from arbitrary async streams.
    #[must_use]
    pub fn from_pipe(
        reader: impl AsyncRead + Send + Sync + Unpin + 'static,
        writer: impl AsyncWrite + Send + Sync + Unpin + 'static,
    ) -> Self {
        Self {
            reader: StreamReader::Pipe(BufReader::new(Box::new(reader))),
            writer: StreamWriter::Pipe(Box::new(writer)),
        }
    }

    /// Creates a channel-backed transport from in-process byte channels.
    ///
    /// Each received message is treated as one already-framed line.
    #[must_use]
    pub fn from_channel(incoming: mpsc::Receiver<Vec<u8>>, outgoing: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            reader: StreamReader::Channel(incoming),
            writer: StreamWriter::Channel(Some(outgoing)),
        }
    }

    /// Reads the next line from the stream.
    ///
    /// Returns `None` on end-of-stream. The trailing newline (and any
    /// carriage return) is stripped. A partial line at end-of-stream is
    /// returned as a line; callers must treat it as one.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from a pipe stream fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match &mut self.reader {
            StreamReader::Pipe(reader) => {
                let mut line = Vec::new();
                let bytes_read = reader.read_until(b'\n', &mut line).await?;

                if bytes_read == 0 {
                    // EOF - source closed
                    return Ok(None);
                }

                strip_line_ending(&mut line);
                Ok(Some(line))
            }
            StreamReader::Channel(receiver) => match receiver.recv().await {
                Some(mut message) => {
                    strip_line_ending(&mut message);
                    Ok(Some(message))
                }
                None => Ok(None),
            },
        }
    }

    /// Writes a response envelope as one line.
    ///
    /// The envelope is serialised to JSON, terminated with a newline, and
    /// drained before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_envelope(&mut self, envelope: &ResponseEnvelope) -> io::Result<()> {
        let json = envelope
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.write(json.as_bytes()).await?;
        self.drain().await
    }

    /// Writes one payload as a newline-terminated line.
    ///
    /// A missing trailing newline on the payload is tolerated; one is
    /// appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sink fails or was closed.
    pub async fn write(&mut self, payload: &[u8]) -> io::Result<()> {
        match &mut self.writer {
            StreamWriter::Pipe(writer) => {
                writer.write_all(payload).await?;
                if !payload.ends_with(b"\n") {
                    writer.write_all(b"\n").await?;
                }
                Ok(())
            }
            StreamWriter::Channel(sender) => {
                let sender = sender
                    .as_ref()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

                let mut message = payload.to_vec();
                if !message.ends_with(b"\n") {
                    message.push(b'\n');
                }

                sender
                    .send(message)
                    .await
                    .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }
    }

    /// Returns once buffered output has been flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing a pipe stream fails.
    pub async fn drain(&mut self) -> io::Result<()> {
        match &mut self.writer {
            StreamWriter::Pipe(writer) => writer.flush().await,
            // Channel sends are synchronously visible to the receiver
            StreamWriter::Channel(_) => Ok(()),
        }
    }

    /// Closes the writing half of the transport.
    ///
    /// For channel streams the peer observes end-of-stream; for pipe
    /// streams the sink is shut down. Subsequent writes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down a pipe stream fails.
    pub async fn close(&mut self) -> io::Result<()> {
        match &mut self.writer {
            StreamWriter::Pipe(writer) => writer.shutdown().await,
            StreamWriter::Channel(sender) => {
                sender.take();
                Ok(())
            }
        }
    }
}

/// Strips one trailing `\n` (and a preceding `\r`) in place.
fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
