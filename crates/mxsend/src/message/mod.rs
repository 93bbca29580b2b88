//! Outgoing message model and its DATA serialization.

mod header;

pub use header::{Header, canonical_key, sanitize_value, validate_field_name};

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::validate_line;
use crate::connection::BodyWriter;
use crate::error::{Error, Result};
use header::write_field;

/// Header keys filled from the envelope fields and never taken from
/// [`Message::header`].
pub const RESERVED_KEYS: [&str; 3] = ["From", "To", "Subject"];

/// Message body source.
pub enum Body {
    /// In-memory body, reusable across sends.
    Bytes(Bytes),
    /// Streamed body, consumed by the first send that reaches DATA.
    Reader(Option<Box<dyn AsyncRead + Send + Unpin>>),
}

impl Default for Body {
    fn default() -> Self {
        Self::Bytes(Bytes::new())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(Some(_)) => f.write_str("Reader(..)"),
            Self::Reader(None) => f.write_str("Reader(consumed)"),
        }
    }
}

/// Body taken out of a message for one DATA phase.
enum BodySource {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

/// An outgoing email message.
///
/// `to` and `bcc` become envelope recipients; `cc` is written as headers
/// only and `bcc` never appears in the headers.
#[derive(Debug, Default)]
pub struct Message {
    /// Sender address.
    pub from: String,
    /// `To` recipients.
    pub to: Vec<String>,
    /// `Cc` addresses (headers only).
    pub cc: Vec<String>,
    /// `Bcc` recipients (envelope only).
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Additional header fields.
    pub header: Header,
    body: Body,
}

impl Message {
    /// Creates a message from `from` with an empty body.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    /// Adds a `To` recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a `Cc` address.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a `Bcc` recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Adds a header field.
    #[must_use]
    pub fn header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.header.add(key, value);
        self
    }

    /// Sets an in-memory body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Sets a streamed body. It can be sent once.
    #[must_use]
    pub fn body_reader<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body = Body::Reader(Some(Box::new(reader)));
        self
    }

    /// Replaces the body source.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Returns the body source.
    #[must_use]
    pub const fn body_source(&self) -> &Body {
        &self.body
    }

    /// Returns the envelope recipients: every `To`, then every `Bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.iter().chain(&self.bcc).map(String::as_str)
    }

    /// Checks everything that can fail before a connection is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineInjection`] if the sender, a recipient or a
    /// header key contains CR or LF, [`Error::InvalidHeaderName`] for any
    /// other malformed header key, and [`Error::InvalidState`] if a
    /// streamed body was already consumed.
    pub fn validate(&self) -> Result<()> {
        validate_line(&self.from)?;
        for rcpt in self.recipients() {
            validate_line(rcpt)?;
        }
        for (key, _) in self.header.iter() {
            validate_field_name(key)?;
        }
        if matches!(self.body, Body::Reader(None)) {
            return Err(consumed());
        }
        Ok(())
    }

    /// Serializes the header block, including the blank separator line.
    ///
    /// # Errors
    ///
    /// Returns an error if a header key fails [`validate_field_name`].
    pub fn header_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        write_field(&mut out, "From", &self.from)?;
        for to in &self.to {
            write_field(&mut out, "To", to)?;
        }
        for cc in &self.cc {
            write_field(&mut out, "Cc", cc)?;
        }
        write_field(&mut out, "Subject", &self.subject)?;
        self.header.write_subset(&mut out, &RESERVED_KEYS)?;
        out.extend_from_slice(b"\r\n");
        Ok(out)
    }

    /// Writes headers and body through a DATA body writer.
    ///
    /// A streamed body is taken out of the message and dropped before this
    /// returns, whether or not the write succeeds. The terminating `.` line
    /// is not written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the streamed body was already
    /// consumed, or any header or I/O error.
    pub async fn write_to<S>(&mut self, writer: &mut BodyWriter<'_, S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let source = self.take_body()?;
        let headers = self.header_bytes()?;
        writer.write(&headers).await?;
        match source {
            BodySource::Bytes(bytes) => writer.write(&bytes).await,
            BodySource::Reader(mut reader) => {
                let copied = writer.copy_from(&mut reader).await?;
                tracing::trace!(bytes = copied, "Body copied");
                Ok(())
            }
        }
    }

    fn take_body(&mut self) -> Result<BodySource> {
        match &mut self.body {
            Body::Bytes(bytes) => Ok(BodySource::Bytes(bytes.clone())),
            Body::Reader(reader) => reader.take().map(BodySource::Reader).ok_or_else(consumed),
        }
    }
}

fn consumed() -> Error {
    Error::InvalidState("Message body reader already consumed".into())
}
