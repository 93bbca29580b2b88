//! The SMTP submission state machine.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::command::{Command, validate_line};
use crate::connection::{Config, Connection, LineTransport, Security, SmtpStream};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::resolver::{DnsResolver, MxResolver, dial, resolve, split_host_port};
use crate::types::{Capabilities, Expect, ReplyCode};

/// A reusable submission session with one remote mail domain.
///
/// Every [`Session::send`] resolves, dials and runs one full transaction
/// on a fresh connection:
///
/// ```text
/// Idle ─ dial ─→ Connected ─ 220 ─→ Greeted ─ STARTTLS ─→ TlsUpgraded
///                                      │                       │
///                                      └──────────┬────────────┘
///                                                 ↓
///  Closed ←─ QUIT ─ DataSent ←─ DATA ─ RecipientsAdded ←─ RCPT ─ MailStarted
/// ```
#[derive(Debug)]
pub struct Session<R = DnsResolver> {
    remote: String,
    local_name: String,
    capabilities: Capabilities,
    config: Config,
    resolver: R,
}

impl Session<DnsResolver> {
    /// Creates a session for `remote` (`host:port`) with default settings
    /// and the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be read.
    pub fn new(remote: impl Into<String>) -> Result<Self> {
        Self::with_config(remote, Config::default())
    }

    /// Creates a session for `remote` with the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be read.
    pub fn with_config(remote: impl Into<String>, config: Config) -> Result<Self> {
        Ok(Self::with_resolver(
            remote,
            config,
            DnsResolver::from_system_conf()?,
        ))
    }
}

impl<R: MxResolver> Session<R> {
    /// Creates a session that looks up MX records through `resolver`.
    #[must_use]
    pub fn with_resolver(remote: impl Into<String>, config: Config, resolver: R) -> Self {
        Self {
            remote: remote.into(),
            local_name: crate::connection::DEFAULT_LOCAL_NAME.to_string(),
            capabilities: Capabilities::new(),
            config,
            resolver,
        }
    }

    /// Returns the remote identifier.
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Returns the local name the last successful EHLO used.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Returns the capabilities from the most recent EHLO.
    ///
    /// Empty before the first send and after a HELO fallback.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the session settings.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Delivers `message` in one full SMTP transaction.
    ///
    /// The connection is closed before this returns, on every path. A
    /// streamed body is consumed even if delivery fails after DATA.
    ///
    /// # Errors
    ///
    /// Returns the first failure: validation, resolution, dialing, a
    /// rejected command, or I/O. Nothing is retried.
    pub async fn send(&mut self, message: &mut Message) -> Result<()> {
        self.capabilities = Capabilities::new();

        validate_line(&self.config.local_name)?;
        message.validate()?;
        let (host, _) = split_host_port(&self.remote)?;

        let targets = resolve(&self.resolver, &self.remote, self.config.resolve_attempts).await?;
        let (tcp, target) = dial(&targets, self.config.connect_timeout).await?;
        tracing::debug!(%target, remote = %self.remote, "Connected");

        let mut conn = Connection::new(SmtpStream::Tcp(tcp), self.config.io_timeout);
        let result = self.run(&mut conn, &host, message).await;
        let closed = conn.close().await;

        match (result, closed) {
            (Ok(()), Ok(())) => {
                tracing::info!(remote = %self.remote, from = %message.from, "Message delivered");
                Ok(())
            }
            (Ok(()), Err(e)) => {
                tracing::warn!(error = %e, "Failed to close connection after delivery");
                Ok(())
            }
            (Err(e), _) => {
                tracing::debug!(error = %e, remote = %self.remote, "Delivery failed");
                Err(e)
            }
        }
    }

    /// Like [`Session::send`], but gives up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the deadline passes first, plus the
    /// errors of [`Session::send`].
    pub async fn send_before(&mut self, message: &mut Message, deadline: Instant) -> Result<()> {
        tokio::time::timeout_at(deadline, self.send(message))
            .await
            .map_err(|_| Error::Timeout("Send deadline exceeded".into()))?
    }

    async fn run(&mut self, conn: &mut Connection, host: &str, message: &mut Message) -> Result<()> {
        conn.transport()?
            .read_greeting(Expect::from(ReplyCode::SERVICE_READY))
            .await?;
        self.hello(conn.transport()?).await?;

        if self.config.security == Security::StartTls {
            if self.capabilities.supports_starttls() {
                conn.transport()?
                    .exec_command(
                        Expect::from(ReplyCode::SERVICE_READY),
                        &Command::StartTls,
                    )
                    .await?;
                conn.upgrade(self.config.tls.clone(), host).await?;
                self.capabilities = Capabilities::new();
                self.hello(conn.transport()?).await?;
            } else {
                tracing::debug!(remote = %self.remote, "STARTTLS not advertised, staying in plaintext");
            }
        }

        self.transact(conn.transport()?, message).await
    }

    /// Sends EHLO, falling back to HELO when the server rejects it.
    async fn hello<S>(&mut self, transport: &mut LineTransport<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let hostname = self.config.local_name.clone();
        let ehlo = Command::Ehlo {
            hostname: hostname.clone(),
        };

        match transport.exec_command(Expect::from(ReplyCode::OK), &ehlo).await {
            Ok(reply) => {
                self.capabilities = Capabilities::from_ehlo(&reply);
                self.local_name = hostname;
                tracing::debug!(extensions = self.capabilities.len(), "EHLO accepted");
                Ok(())
            }
            Err(Error::UnexpectedResponse { code, .. }) => {
                tracing::debug!(code, "EHLO rejected, falling back to HELO");
                self.capabilities = Capabilities::new();
                transport
                    .exec_command(Expect::from(ReplyCode::OK), &Command::Helo { hostname })
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs MAIL, RCPT, DATA and QUIT.
    async fn transact<S>(&self, transport: &mut LineTransport<S>, message: &mut Message) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ok = Expect::from(ReplyCode::OK);

        let mail = Command::MailFrom {
            from: message.from.clone(),
            eight_bit_mime: self.capabilities.supports_8bitmime(),
        };
        transport.exec_command(ok, &mail).await?;

        for rcpt in message.recipients() {
            let rcpt = Command::RcptTo {
                to: rcpt.to_string(),
            };
            transport.exec_command(Expect::Class(25), &rcpt).await?;
        }

        transport
            .exec_command(Expect::from(ReplyCode::START_DATA), &Command::Data)
            .await?;
        let mut body = transport.body_writer();
        message.write_to(&mut body).await?;
        let end = body.finish().await?;
        transport.read_response_to(end, ok).await?;

        transport
            .exec_command(Expect::from(ReplyCode::CLOSING), &Command::Quit)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::resolver::MxOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct CountingResolver {
        lookups: AtomicUsize,
    }

    impl MxResolver for CountingResolver {
        async fn lookup_mx(&self, _host: &str) -> MxOutcome {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            MxOutcome::Failed("no DNS in unit tests".into())
        }
    }

    fn stub_session(config: Config) -> Session<CountingResolver> {
        Session::with_resolver("mail.example.com:25", config, CountingResolver::default())
    }

    #[tokio::test]
    async fn ehlo_populates_capabilities() {
        let mock = Builder::new()
            .write(b"EHLO client.example.org\r\n")
            .read(b"250-mx.example.com\r\n250-8BITMIME\r\n250-SIZE 35882577\r\n250 AUTH PLAIN LOGIN\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let mut session = stub_session(Config::builder().local_name("client.example.org").build());

        session.hello(&mut transport).await.unwrap();

        let caps = session.capabilities();
        assert!(caps.supports_8bitmime());
        assert_eq!(caps.param("SIZE"), Some("35882577"));
        assert_eq!(caps.param("AUTH"), Some("PLAIN LOGIN"));
        assert_eq!(caps.auth_mechanisms(), ["PLAIN", "LOGIN"]);
        assert_eq!(session.local_name(), "client.example.org");
    }

    #[tokio::test]
    async fn helo_fallback_clears_capabilities() {
        let mock = Builder::new()
            .write(b"EHLO localhost\r\n")
            .read(b"502 5.5.1 command not recognized\r\n")
            .write(b"HELO localhost\r\n")
            .read(b"250 mx.example.com\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let mut session = stub_session(Config::default());
        session.capabilities = Capabilities::parse(["8BITMIME", "STARTTLS"]);

        session.hello(&mut transport).await.unwrap();
        assert!(session.capabilities().is_empty());
    }

    #[tokio::test]
    async fn helo_failure_is_returned() {
        let mock = Builder::new()
            .write(b"EHLO localhost\r\n")
            .read(b"500 no\r\n")
            .write(b"HELO localhost\r\n")
            .read(b"421 closing\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let mut session = stub_session(Config::default());

        let err = session.hello(&mut transport).await.unwrap_err();
        assert_eq!(err.reply_code(), Some(421));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn transaction_transcript() {
        let mock = Builder::new()
            .write(b"MAIL FROM:<a@x.com> BODY=8BITMIME\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<hidden@y.com>\r\n")
            .read(b"251 will forward\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"From: a@x.com\r\nTo: b@y.com\r\nSubject: Hi\r\n\r\n")
            .write(b"Hello\r\n..\r\nWorld\r\n")
            .write(b".\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let mut session = stub_session(Config::default());
        session.capabilities = Capabilities::parse(["8BITMIME"]);
        let mut msg = Message::new("a@x.com")
            .to("b@y.com")
            .bcc("hidden@y.com")
            .subject("Hi")
            .body("Hello\r\n.\r\nWorld\r\n");

        session.transact(&mut transport, &mut msg).await.unwrap();
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn rejected_recipient_aborts() {
        let mock = Builder::new()
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<b@y.com>\r\n")
            .read(b"550 5.1.1 no such user\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let session = stub_session(Config::default());
        let mut msg = Message::new("a@x.com").to("b@y.com").to("c@y.com");

        let err = session.transact(&mut transport, &mut msg).await.unwrap_err();
        assert!(err.is_permanent());
        assert!(matches!(
            err,
            Error::UnexpectedResponse { expected: Expect::Class(25), code: 550, .. }
        ));
    }

    #[tokio::test]
    async fn failed_quit_is_reported() {
        let mock = Builder::new()
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"From: a@x.com\r\nSubject: \r\n\r\n.\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"500 what\r\n")
            .build();
        let mut transport = LineTransport::new(mock, TIMEOUT);
        let session = stub_session(Config::default());
        let mut msg = Message::new("a@x.com");

        let err = session.transact(&mut transport, &mut msg).await.unwrap_err();
        assert_eq!(err.reply_code(), Some(500));
    }

    #[tokio::test]
    async fn injection_fails_before_lookup() {
        let mut session = stub_session(Config::builder().local_name("evil\r\nQUIT").build());
        let mut msg = Message::new("a@x.com").to("b@y.com");
        let err = session.send(&mut msg).await.unwrap_err();
        assert!(matches!(err, Error::LineInjection));

        let mut session = stub_session(Config::default());
        let mut msg = Message::new("a@x.com").to("b@y.com\r\nDATA");
        let err = session.send(&mut msg).await.unwrap_err();
        assert!(matches!(err, Error::LineInjection));
        assert_eq!(session.resolver.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_remote_fails_before_lookup() {
        let mut session =
            Session::with_resolver("mail.example.com", Config::default(), CountingResolver::default());
        let mut msg = Message::new("a@x.com").to("b@y.com");
        let err = session.send(&mut msg).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert_eq!(session.resolver.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolution_failure_is_returned() {
        let mut session = stub_session(Config::default());
        let mut msg = Message::new("a@x.com").to("b@y.com");
        let err = session.send(&mut msg).await.unwrap_err();
        assert!(matches!(err, Error::ResolutionPermanent { .. }));
        assert_eq!(session.resolver.lookups.load(Ordering::SeqCst), 1);
    }
}
