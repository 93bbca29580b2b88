//! Command/reply framing over a byte stream.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::dot::BodyWriter;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Expect, Reply};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum reply line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum number of lines in one reply.
const MAX_REPLY_LINES: usize = 1024;

/// Identifier of a command written to the transport.
///
/// Replies are matched to commands strictly in the order the commands
/// were sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    /// Returns the sequence number of the command.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Runs an I/O future under a time limit.
pub(crate) async fn timed<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(format!("{what} after {limit:?}"))),
    }
}

/// SMTP framing layer: CRLF command lines out, multi-line replies in.
pub struct LineTransport<S> {
    reader: BufReader<S>,
    io_timeout: Duration,
    next_id: u64,
    awaiting: VecDeque<CommandId>,
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a framing layer over `stream`.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            io_timeout,
            next_id: 0,
            awaiting: VecDeque::new(),
        }
    }

    /// Writes one command line and returns its id.
    ///
    /// Arguments are validated before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineInjection`] if an argument contains CR or LF, or
    /// an I/O error if the write fails.
    pub async fn send_command(&mut self, command: &Command) -> Result<CommandId> {
        let data = command.serialize()?;
        tracing::debug!(command = %String::from_utf8_lossy(&data[..data.len() - 2]), "C:");
        self.write_raw(&data).await?;
        Ok(self.register())
    }

    /// Reads the reply to the oldest outstanding command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResponse`] if the code does not satisfy
    /// `expect`, [`Error::InvalidState`] if no command is outstanding, or a
    /// protocol/I/O error if the reply cannot be read.
    pub async fn read_response(&mut self, expect: Expect) -> Result<Reply> {
        if self.awaiting.pop_front().is_none() {
            return Err(Error::InvalidState("No command awaiting a reply".into()));
        }
        self.read_expected(expect).await
    }

    /// Reads the reply to a specific command, which must be the oldest
    /// outstanding one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if `id` is not next in line, plus the
    /// errors of [`LineTransport::read_response`].
    pub async fn read_response_to(&mut self, id: CommandId, expect: Expect) -> Result<Reply> {
        match self.awaiting.front() {
            Some(next) if *next == id => self.read_response(expect).await,
            Some(next) => Err(Error::InvalidState(format!(
                "Reply for command {} requested before command {}",
                id.get(),
                next.get()
            ))),
            None => Err(Error::InvalidState("No command awaiting a reply".into())),
        }
    }

    /// Reads a reply nobody asked for (the connection greeting).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if commands are outstanding, plus the
    /// errors of [`LineTransport::read_response`].
    pub async fn read_greeting(&mut self, expect: Expect) -> Result<Reply> {
        if !self.awaiting.is_empty() {
            return Err(Error::InvalidState(
                "Greeting read while commands are outstanding".into(),
            ));
        }
        self.read_expected(expect).await
    }

    /// Sends a command and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`LineTransport::send_command`] and
    /// [`LineTransport::read_response`].
    pub async fn exec_command(&mut self, expect: Expect, command: &Command) -> Result<Reply> {
        let id = self.send_command(command).await?;
        self.read_response_to(id, expect).await
    }

    /// Returns the number of commands still waiting for a reply.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.awaiting.len()
    }

    /// Opens the dot-stuffing body writer for the DATA phase.
    pub fn body_writer(&mut self) -> BodyWriter<'_, S> {
        BodyWriter::new(self)
    }

    /// Returns a reference to the underlying stream.
    pub fn stream_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Returns the underlying stream, dropping any buffered input.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Flushes the framing layer, then shuts the stream down.
    ///
    /// Both steps always run; the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the flush error, or else the shutdown error.
    pub async fn close(self) -> Result<()> {
        let limit = self.io_timeout;
        let mut stream = self.reader.into_inner();
        let flushed = timed(limit, "flush", stream.flush()).await;
        let shut = timed(limit, "shutdown", stream.shutdown()).await;
        flushed.and(shut)
    }

    pub(crate) fn register(&mut self) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        self.awaiting.push_back(id);
        id
    }

    pub(crate) async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        timed(self.io_timeout, "write", async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
    }

    async fn read_expected(&mut self, expect: Expect) -> Result<Reply> {
        let reply = self.read_reply().await?;
        tracing::trace!(code = reply.code.as_u16(), text = %reply.message_text(), "S:");
        if !expect.matches(reply.code) {
            return Err(Error::unexpected(
                expect,
                reply.code.as_u16(),
                reply.message_text(),
            ));
        }
        Ok(reply)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(Error::Protocol(format!(
                    "Reply exceeds {MAX_REPLY_LINES} lines"
                )));
            }
        }

        parse_reply(&lines)
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let limit = MAX_LINE_LENGTH as u64 + 1;
        let reader = &mut self.reader;
        let n = timed(self.io_timeout, "read", async {
            reader.take(limit).read_until(b'\n', &mut buf).await
        })
        .await?;

        if buf.last() != Some(&b'\n') {
            if n > MAX_LINE_LENGTH {
                return Err(Error::Protocol(format!(
                    "Reply line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed while reading reply",
            )));
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
