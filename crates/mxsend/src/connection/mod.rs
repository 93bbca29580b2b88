//! Connection management: raw stream, framing layer and STARTTLS upgrade.

mod config;
mod dot;
mod stream;
mod transport;

pub use config::{Config, ConfigBuilder, DEFAULT_LOCAL_NAME, Security};
pub use dot::{BodyWriter, DotStuffer};
pub use stream::{SmtpStream, default_tls_config};
pub use transport::{CommandId, LineTransport};

pub(crate) use transport::timed;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// An open SMTP connection.
///
/// Owns the framing layer and, through it, the stream. A STARTTLS upgrade
/// consumes both and installs TLS-wrapped replacements over the same
/// socket, so the plaintext stream is unreachable afterwards.
pub struct Connection {
    transport: Option<LineTransport<SmtpStream>>,
    io_timeout: Duration,
}

impl Connection {
    /// Wraps a freshly dialed stream.
    #[must_use]
    pub fn new(stream: SmtpStream, io_timeout: Duration) -> Self {
        Self {
            transport: Some(LineTransport::new(stream, io_timeout)),
            io_timeout,
        }
    }

    /// Returns the framing layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if a failed upgrade destroyed it.
    pub fn transport(&mut self) -> Result<&mut LineTransport<SmtpStream>> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::InvalidState("Connection lost during TLS upgrade".into()))
    }

    /// Returns true once the connection runs over TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.stream_ref().is_tls())
    }

    /// Replaces the stream with TLS and rebuilds the framing layer.
    ///
    /// Must be called right after the server accepted `STARTTLS`. If the
    /// handshake fails the socket is dropped and the connection is unusable.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or the hostname is invalid.
    pub async fn upgrade(
        &mut self,
        tls: Option<Arc<rustls::ClientConfig>>,
        hostname: &str,
    ) -> Result<()> {
        let old = self
            .transport
            .take()
            .ok_or_else(|| Error::InvalidState("Connection lost during TLS upgrade".into()))?;
        let stream = old.into_inner();

        let upgraded = tokio::time::timeout(self.io_timeout, stream.upgrade_to_tls(tls, hostname))
            .await
            .map_err(|_| Error::Timeout(format!("TLS handshake after {:?}", self.io_timeout)))??;

        self.transport = Some(LineTransport::new(upgraded, self.io_timeout));
        tracing::debug!(hostname, "TLS established");
        Ok(())
    }

    /// Closes the framing layer, then the stream. First error wins.
    ///
    /// # Errors
    ///
    /// Returns the first flush or shutdown error.
    pub async fn close(self) -> Result<()> {
        match self.transport {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }
}
