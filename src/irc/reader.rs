use bytes::BytesMut;
use futures::{FutureExt, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::warn;

use crate::Error;
use crate::consts::MAX_LINE_LENGTH;

/// Splits a byte stream into lines terminated by `\n` or `\r\n`.
///
/// Empty lines are skipped and invalid UTF-8 is replaced rather than rejected. A line longer than
/// the maximum length is dropped up to and including its terminator.
#[derive(Debug)]
pub struct LineCodec {
    /// Where to continue looking for a terminator.
    next_index: usize,
    max_length: usize,
    /// Dropping the rest of an overlong line.
    discarding: bool,
}

impl LineCodec {
    /// Creates a codec that accepts lines of at most `max_length` bytes.
    #[must_use]
    pub const fn new(max_length: usize) -> Self {
        LineCodec {
            next_index: 0,
            max_length,
            discarding: false,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        LineCodec::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_length {
                    if !self.discarding {
                        warn!(limit = self.max_length, "discarding overlong line");
                    }

                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = src.len();
                }

                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }

            if line.len() > self.max_length {
                warn!(length = line.len(), limit = self.max_length, "discarding overlong line");
                continue;
            }

            let line = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if !line.is_empty() {
                return Ok(Some(String::from_utf8_lossy(line).into_owned()));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Error> {
        let line = self.decode(src)?;

        // An unterminated tail is dropped with the connection.
        if line.is_none() {
            src.clear();
            self.next_index = 0;
        }

        Ok(line)
    }
}

/// Reads lines from a stream.
///
/// Bytes after the last line terminator are kept until the rest of the line arrives.
pub struct LineReader<R> {
    frames: FramedRead<R, LineCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wraps the given stream.
    pub fn new(inner: R) -> Self {
        Self::with_codec(inner, LineCodec::default())
    }

    /// Wraps the given stream, splitting it with `codec`.
    pub fn with_codec(inner: R, codec: LineCodec) -> Self {
        LineReader {
            frames: FramedRead::new(inner, codec),
        }
    }

    /// Waits for the next line and returns it along with every other line already buffered.
    ///
    /// This is cancel safe: partial lines stay buffered when the future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] when the remote end has closed the stream and
    /// [`Error::Read`] when the read itself fails.
    pub async fn read_lines(&mut self) -> Result<Vec<String>, Error> {
        let first = self.frames.next().await.ok_or(Error::ConnectionLost)??;
        let mut lines = vec![first];

        while let Some(Some(line)) = self.frames.next().now_or_never() {
            lines.push(line?);
        }

        Ok(lines)
    }

    /// Returns the number of bytes buffered from an incomplete line.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.frames.read_buffer().len()
    }
}
