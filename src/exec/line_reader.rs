// src/exec/line_reader.rs

//! Per-process stdout reader feeding a bounded channel.
//!
//! Reading is decoupled from consumption: the reader only splits the stream
//! into lines, the process runner writes them to the log and parses them.

use std::io;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, trace};

use crate::task::TaskId;

/// Lines buffered between the reader and the consumer.
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// Longest chunk forwarded as one line. A longer run of bytes without a
/// newline is forwarded in pieces of this size, so memory stays bounded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One raw line including its trailing `\n` (absent on a final unterminated
/// line or an oversized piece), or the read error that ended the stream.
pub type LineResult = io::Result<Vec<u8>>;

/// Splits a byte stream at `\n`, keeping the terminator and every byte
/// verbatim (no UTF-8 decoding).
#[derive(Debug, Clone)]
pub struct RawLineCodec {
    max_length: usize,
    /// Bytes of the buffer already searched for a newline.
    scanned: usize,
}

impl RawLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            scanned: 0,
        }
    }
}

impl Decoder for RawLineCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Vec<u8>>> {
        let window = buf.len().min(self.max_length);
        if let Some(pos) = buf[self.scanned.min(window)..window]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.scanned.min(window) + pos + 1;
            self.scanned = 0;
            return Ok(Some(buf.split_to(end).to_vec()));
        }
        if buf.len() >= self.max_length {
            self.scanned = 0;
            return Ok(Some(buf.split_to(self.max_length).to_vec()));
        }
        self.scanned = buf.len();
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.scanned = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().to_vec()))
        }
    }
}

/// Spawn a reader task draining `source` line by line.
///
/// The channel closes on EOF or after forwarding a read error. The task also
/// stops as soon as the receiver is dropped.
pub fn spawn_line_reader<R>(source: R, task: TaskId) -> (mpsc::Receiver<LineResult>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    spawn_with_codec(source, task, RawLineCodec::new(MAX_LINE_LENGTH))
}

fn spawn_with_codec<R>(
    source: R,
    task: TaskId,
    codec: RawLineCodec,
) -> (mpsc::Receiver<LineResult>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<LineResult>(LINE_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut frames = FramedRead::new(source, codec);
        let mut lines = 0usize;

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(line) => {
                    lines += 1;
                    trace!(task, "stdout: {}", String::from_utf8_lossy(&line).trim_end());
                    if tx.send(Ok(line)).await.is_err() {
                        debug!(task, "line consumer gone; stopping reader");
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }

        debug!(task, lines, "stdout reader reached end of stream");
    });

    (rx, handle)
}
