//! Buffered byte transport over an async stream.
//!
//! Reads accumulate into an input buffer until a decoder can produce a whole
//! value; writes are staged in an output buffer and pushed in full by
//! [`Transport::flush`].

use crate::codec::{DecodeFailure, WireValue, WireWrite};
use crate::error::TransportError;
use crate::message::Opcode;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const INITIAL_BUFFER_SIZE: usize = 8192;

/// One side of an established connection.
pub struct Transport<S> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    closed: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            closed: false,
        }
    }

    /// Reads more bytes from the stream into the input buffer.
    async fn fill(&mut self) -> Result<(), TransportError> {
        if self.read_buf.len() >= MAX_PAYLOAD_SIZE {
            return Err(TransportError::TooLarge {
                size: self.read_buf.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let n = self.stream.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        tracing::trace!("read {} bytes ({} buffered)", n, self.read_buf.len());
        Ok(())
    }

    /// Runs `decode` over the buffered bytes until it succeeds.
    ///
    /// Incomplete results trigger another socket read and a retry from the
    /// start of the buffer. Bytes are consumed only when `decode` succeeds.
    pub async fn read_with<T, E, F>(&mut self, decode: F) -> Result<T, E>
    where
        F: FnMut(&mut &[u8]) -> Result<T, E>,
        E: DecodeFailure + From<TransportError>,
    {
        self.decode_buffered(decode, false).await
    }

    /// Like [`Transport::read_with`], but a final failure still consumes the
    /// bytes `decode` advanced past before failing.
    ///
    /// Used for payloads owned by third-party decoders, where leaving a
    /// half-read request in the buffer would desync the opcode stream.
    pub async fn read_with_discard<T, E, F>(&mut self, decode: F) -> Result<T, E>
    where
        F: FnMut(&mut &[u8]) -> Result<T, E>,
        E: DecodeFailure + From<TransportError>,
    {
        self.decode_buffered(decode, true).await
    }

    async fn decode_buffered<T, E, F>(&mut self, mut decode: F, discard: bool) -> Result<T, E>
    where
        F: FnMut(&mut &[u8]) -> Result<T, E>,
        E: DecodeFailure + From<TransportError>,
    {
        loop {
            let mut cursor: &[u8] = &self.read_buf;
            let result = decode(&mut cursor);
            let consumed = self.read_buf.len() - cursor.len();
            match result {
                Ok(value) => {
                    self.read_buf.advance(consumed);
                    return Ok(value);
                }
                Err(e) if e.is_incomplete() => self.fill().await?,
                Err(e) => {
                    if discard {
                        tracing::debug!("discarding {} bytes of a failed decode", consumed);
                        self.read_buf.advance(consumed);
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn read_value<T: WireValue>(&mut self) -> Result<T, TransportError> {
        self.read_with(|buf| T::decode(buf).map_err(TransportError::from))
            .await
    }

    /// Reads a raw 16-bit opcode. Unknown values are returned as-is so the
    /// caller can offer them to plugins.
    pub async fn read_opcode(&mut self) -> Result<u16, TransportError> {
        self.read_value::<u16>().await
    }

    /// Reads exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, TransportError> {
        while self.read_buf.len() < n {
            self.fill().await?;
        }
        Ok(self.read_buf.split_to(n).freeze())
    }

    /// Number of bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// The output buffer. Bytes written here are sent on the next flush.
    pub fn out(&mut self) -> &mut BytesMut {
        &mut self.write_buf
    }

    /// Number of bytes staged for the next flush.
    pub fn pending(&self) -> usize {
        self.write_buf.len()
    }

    pub fn send<T: WireValue>(&mut self, value: &T) {
        self.write_buf.put_wire(value);
    }

    /// Writes all staged bytes to the stream.
    pub async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            tracing::trace!("wrote {} bytes", self.write_buf.len());
            self.write_buf.clear();
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Stages `opcode` and flushes everything pending.
    pub async fn send_opcode(&mut self, opcode: Opcode) -> Result<(), TransportError> {
        self.write_buf.put_opcode(opcode);
        self.flush().await
    }

    /// Drops staged output without sending it.
    pub fn discard_pending(&mut self) {
        self.write_buf.clear();
    }

    /// Shuts the stream down. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_buf.clear();
        self.stream.shutdown().await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}
