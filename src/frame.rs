// ABOUTME: Length-prefixed framing for IP packets (and the initial Client ID)
// ABOUTME: over any bidirectional byte stream, with buffered check-then-parse reads

use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Cursor};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// Width of the big-endian length header prefixing each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWidth {
    /// 2-byte header, payloads up to 65535 bytes.
    Two,
    /// 4-byte header, for `Config::big_frames`.
    Four,
}

impl HeaderWidth {
    pub fn len(self) -> usize {
        match self {
            HeaderWidth::Two => 2,
            HeaderWidth::Four => 4,
        }
    }

    pub fn max_payload(self) -> usize {
        match self {
            HeaderWidth::Two => u16::MAX as usize,
            HeaderWidth::Four => u32::MAX as usize,
        }
    }
}

/// Configuration for a [`FramedReader`]/[`FramedWriter`] pair.
#[derive(Debug, Clone)]
pub struct FramedConfig {
    pub header_width: HeaderWidth,
    /// Initial capacity of the read buffer and the write buffer.
    pub buffer_capacity: usize,
}

impl Default for FramedConfig {
    fn default() -> Self {
        Self {
            header_width: HeaderWidth::Two,
            buffer_capacity: 4 * 1024,
        }
    }
}

impl FramedConfig {
    pub fn big_frames(mut self) -> Self {
        self.header_width = HeaderWidth::Four;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    /// A frame claims a payload larger than the negotiated header width allows.
    #[error("frame too large: {actual} bytes exceeds max {max}")]
    TooLarge { max: usize, actual: usize },

    /// The stream ended in the middle of a frame.
    #[error("connection reset mid-frame")]
    ShortRead,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Buffered, message-oriented reader over any `AsyncRead` stream.
///
/// Buffers until a full frame is present, then slices it out without
/// re-reading from the socket -- the same check-then-parse shape this
/// crate's connection handling has always used.
#[derive(Debug)]
pub struct FramedReader<R> {
    stream: R,
    buffer: BytesMut,
    header_width: HeaderWidth,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(stream: R, config: &FramedConfig) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(config.buffer_capacity),
            header_width: config.header_width,
        }
    }

    /// Reads a single frame's payload.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream (no partial frame
    /// buffered). Returns `Err(FrameError::ShortRead)` if the peer closed
    /// mid-frame.
    pub async fn read_frame(&mut self) -> Result<Option<BytesMut>, FrameError> {
        loop {
            if let Some(payload) = self.try_parse()? {
                return Ok(Some(payload));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::ShortRead)
                };
            }
        }
    }

    fn try_parse(&mut self) -> Result<Option<BytesMut>, FrameError> {
        let header_len = self.header_width.len();
        if self.buffer.len() < header_len {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.buffer[..header_len]);
        let payload_len = match self.header_width {
            HeaderWidth::Two => cursor.get_u16() as usize,
            HeaderWidth::Four => cursor.get_u32() as usize,
        };

        if payload_len > self.header_width.max_payload() {
            return Err(FrameError::TooLarge {
                max: self.header_width.max_payload(),
                actual: payload_len,
            });
        }

        let total_len = header_len + payload_len;
        if self.buffer.len() < total_len {
            self.buffer.reserve(total_len - self.buffer.len());
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(total_len);
        frame.advance(header_len);
        Ok(Some(frame))
    }
}

/// Buffered, message-oriented writer over any `AsyncWrite` stream.
///
/// Each `write_frame` call writes the whole header+payload and flushes, so no
/// partial frame is ever observable on the wire.
#[derive(Debug)]
pub struct FramedWriter<W> {
    stream: BufWriter<W>,
    header_width: HeaderWidth,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(stream: W, config: &FramedConfig) -> Self {
        Self {
            stream: BufWriter::with_capacity(config.buffer_capacity, stream),
            header_width: config.header_width,
        }
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let max = self.header_width.max_payload();
        if payload.len() > max {
            return Err(FrameError::TooLarge {
                max,
                actual: payload.len(),
            });
        }

        let mut header = BytesMut::with_capacity(self.header_width.len());
        match self.header_width {
            HeaderWidth::Two => header.put_u16(payload.len() as u16),
            HeaderWidth::Four => header.put_u32(payload.len() as u32),
        }

        self.stream.write_all(&header).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Unwraps the underlying transport, discarding any buffered-but-unflushed
    /// bytes (there never are any, since `write_frame` always flushes).
    pub fn into_inner(self) -> W {
        self.stream.into_inner()
    }
}

/// Convenience pairing of a reader and writer over the same stream, split via
/// [`tokio::io::split`] so the halves can move into independent tasks.
pub struct Framed<T> {
    stream: T,
    config: FramedConfig,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Framed<T> {
    pub fn new(stream: T, config: FramedConfig) -> Self {
        Self { stream, config }
    }

    pub fn into_split(
        self,
    ) -> (
        FramedReader<tokio::io::ReadHalf<T>>,
        FramedWriter<tokio::io::WriteHalf<T>>,
    ) {
        let (r, w) = tokio::io::split(self.stream);
        (
            FramedReader::new(r, &self.config),
            FramedWriter::new(w, &self.config),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_handful_of_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let config = FramedConfig::default();

        let mut writer = FramedWriter::new(client, &config);
        let mut reader = FramedReader::new(server, &config);

        let payloads: Vec<&[u8]> = vec![b"", b"hello", b"some ip packet bytes"];
        for p in &payloads {
            writer.write_frame(p).await.unwrap();
        }

        for expected in &payloads {
            let got = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(&got[..], *expected);
        }
    }

    #[tokio::test]
    async fn clean_eof_between_frames_returns_none() {
        let (client, server) = tokio::io::duplex(1024);
        let config = FramedConfig::default();
        drop(client);
        let mut reader: FramedReader<_> = FramedReader::new(server, &config);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mid_frame_close_is_a_short_read_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        let config = FramedConfig::default();
        client.write_all(&[0, 10]).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        let mut reader = FramedReader::new(server, &config);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ShortRead));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_touching_the_stream() {
        let (client, _server) = tokio::io::duplex(1024);
        let config = FramedConfig::default();
        let mut writer = FramedWriter::new(client, &config);

        let too_big = vec![0u8; HeaderWidth::Two.max_payload() + 1];
        let err = writer.write_frame(&too_big).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn big_frames_negotiate_a_four_byte_header() {
        let (client, server) = tokio::io::duplex(1 << 17);
        let config = FramedConfig::default().big_frames();

        let mut writer = FramedWriter::new(client, &config);
        let mut reader = FramedReader::new(server, &config);

        let payload = vec![7u8; 70_000];
        writer.write_frame(&payload).await.unwrap();
        let got = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(got.len(), payload.len());
    }
}
