//! CRLF line framing for server replies
//!
//! Replies arrive in arbitrary chunks. The reader keeps whatever follows the
//! last delimiter in its buffer and hands out one line per call:
//! ```text
//! 250-mysmtp greets client\r\n250 VRFY\r\n
//! ```
//! yields `250-mysmtp greets client` and then `250 VRFY`.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes requested from the stream per read
const READ_CHUNK: usize = 256;

const DELIMITER: &[u8] = b"\r\n";

/// Stateful reader producing CRLF-delimited lines
///
/// One reader belongs to one connection; a new connection gets a new reader
/// and therefore an empty buffer.
pub struct FramedReader<R> {
    inner: R,
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no delimiter
    scanned: usize,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            scanned: 0,
        }
    }

    /// Read the next delimited line
    ///
    /// Returns `Ok(None)` at end of stream. A trailing fragment without a
    /// delimiter is never returned.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = find_delimiter(&self.buf[self.scanned..]) {
                let end = self.scanned + pos;
                let line = decode(&self.buf[..end]);
                self.buf.drain(..end + DELIMITER.len());
                self.scanned = 0;
                return Ok(Some(line));
            }
            // A CR at the very end may still pair with the next byte.
            self.scanned = self.buf.len().saturating_sub(DELIMITER.len() - 1);

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    tracing::trace!("Discarding {} unterminated bytes at EOF", self.buf.len());
                }
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

/// Single-byte decoding: every byte maps to the char with the same value,
/// so the first three bytes of a line are always its first three chars.
fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
