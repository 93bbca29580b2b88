//! Dot-stuffed message body writing for the DATA phase.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::{CommandId, LineTransport};
use crate::error::Result;

const COPY_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing written yet.
    Begin,
    /// At the start of a line.
    BeginLine,
    /// Inside a line.
    Data,
    /// Just saw a CR.
    Cr,
}

/// Converts a byte stream to SMTP DATA framing.
///
/// A bare LF becomes CRLF and every line starting with `.` gets a second
/// `.` in front. [`DotStuffer::finish`] ends an unterminated last line and
/// appends the `.` terminator line.
#[derive(Debug, Clone)]
pub struct DotStuffer {
    state: State,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self {
            state: State::Begin,
        }
    }
}

impl DotStuffer {
    /// Creates a stuffer positioned at the start of the body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the stuffed form of `chunk` to `out`.
    pub fn stuff(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len());
        for &b in chunk {
            if self.state == State::Cr {
                self.state = State::Data;
                if b == b'\n' {
                    self.state = State::BeginLine;
                    out.push(b);
                    continue;
                }
            }
            if matches!(self.state, State::Begin | State::BeginLine) {
                self.state = State::Data;
                if b == b'.' {
                    out.push(b'.');
                }
            }
            match b {
                b'\r' => self.state = State::Cr,
                b'\n' => {
                    out.push(b'\r');
                    self.state = State::BeginLine;
                }
                _ => {}
            }
            out.push(b);
        }
    }

    /// Appends the end-of-data sequence to `out`.
    pub fn finish(self, out: &mut Vec<u8>) {
        match self.state {
            State::BeginLine => {}
            State::Cr => out.push(b'\n'),
            State::Begin | State::Data => out.extend_from_slice(b"\r\n"),
        }
        out.extend_from_slice(b".\r\n");
    }
}

/// Writer for the message body, borrowed from a [`LineTransport`].
///
/// Must be closed with [`BodyWriter::finish`], which returns the id to
/// read the final reply with.
pub struct BodyWriter<'a, S> {
    transport: &'a mut LineTransport<S>,
    stuffer: DotStuffer,
    buf: Vec<u8>,
}

impl<'a, S> BodyWriter<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: &'a mut LineTransport<S>) -> Self {
        Self {
            transport,
            stuffer: DotStuffer::new(),
            buf: Vec::with_capacity(COPY_BUFFER_SIZE),
        }
    }

    /// Writes body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.clear();
        self.stuffer.stuff(data, &mut self.buf);
        self.transport.write_raw(&self.buf).await
    }

    /// Copies `reader` to the body until it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source or writing the stream fails.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut chunk = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write(&chunk[..n]).await?;
            total += n as u64;
        }
    }

    /// Writes the terminating `.` line and flushes.
    ///
    /// The end of data counts as a command: its reply is read with
    /// [`LineTransport::read_response_to`].
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub async fn finish(self) -> Result<CommandId> {
        let mut tail = Vec::with_capacity(5);
        self.stuffer.finish(&mut tail);
        self.transport.write_raw(&tail).await?;
        Ok(self.transport.register())
    }
}
