//! Length-prefixed JSON-RPC message framing.
//!
//! Every message on the wire is `Content-Length: N\r\n\r\n` followed by
//! exactly N body bytes of JSON. No other header is required; unknown
//! headers are ignored and header names match case-insensitively.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Cap on a single message body (4 MiB).
const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value: {0}")]
    InvalidContentLength(String),

    #[error("message of {0} bytes exceeds limit of {MAX_MESSAGE_BYTES}")]
    Oversized(usize),

    #[error("unexpected EOF inside a message")]
    TruncatedMessage,

    #[error("message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads framed JSON-RPC messages from an async stream.
pub struct MessageReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    /// Read one message.
    ///
    /// Returns `Ok(None)` only on clean EOF before any header byte. A
    /// declared length of zero is an empty frame carrying no message; it
    /// is skipped and reading continues with the next frame.
    pub async fn read_message(&mut self) -> Result<Option<serde_json::Value>, CodecError> {
        loop {
            let Some(length) = self.read_headers().await? else {
                return Ok(None);
            };
            if length == 0 {
                continue;
            }
            if length > MAX_MESSAGE_BYTES {
                return Err(CodecError::Oversized(length));
            }

            let mut body = vec![0u8; length];
            self.inner
                .read_exact(&mut body)
                .await
                .map_err(|_| CodecError::TruncatedMessage)?;

            return Ok(Some(serde_json::from_slice(&body)?));
        }
    }

    /// Consume header lines up to the blank separator and return the
    /// declared content length. `None` means EOF before any header.
    async fn read_headers(&mut self) -> Result<Option<usize>, CodecError> {
        let mut length: Option<usize> = None;
        let mut line = String::new();
        let mut read_anything = false;

        loop {
            line.clear();
            let n = self.inner.read_line(&mut line).await?;
            if n == 0 {
                if read_anything {
                    // EOF mid-headers is a truncated message, not a clean end.
                    return Err(CodecError::TruncatedMessage);
                }
                return Ok(None);
            }
            read_anything = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            if let Some((key, value)) = trimmed.split_once(':') {
                if key.trim().eq_ignore_ascii_case("content-length") {
                    let value = value.trim();
                    length = Some(
                        value
                            .parse()
                            .map_err(|_| CodecError::InvalidContentLength(value.to_string()))?,
                    );
                }
            }
        }

        match length {
            Some(len) => Ok(Some(len)),
            None => Err(CodecError::MissingContentLength),
        }
    }
}

/// Writes framed JSON-RPC messages to an async stream.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Serialize `msg` and write it with its `Content-Length` header.
    pub async fn write_message(&mut self, msg: &serde_json::Value) -> Result<(), CodecError> {
        let body = serde_json::to_vec(msg)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(&body).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
