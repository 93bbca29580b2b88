//! Mail exchanger resolution and dialing.
//!
//! A remote identifier `host:port` becomes an ordered list of connect
//! targets: one per MX record, or the host itself when it has none.
//! Temporary DNS failures are retried with capped exponential backoff;
//! every other failure is final.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::{ResolveError, ResolveErrorKind, TokioResolver};
use tokio::net::TcpStream;

use crate::connection::timed;
use crate::error::{Error, Result};

/// First retry delay after a temporary DNS failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(5);

/// Upper bound of the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// A host and port to dial.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Mail exchanger host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Splits `host:port` (or `[v6-address]:port`) into its parts.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if the port is missing or not a number,
/// or the host is empty.
pub fn split_host_port(remote: &str) -> Result<(String, u16)> {
    let invalid = |why: &str| Error::InvalidAddress(format!("{remote}: {why}"));

    let (host, port) = if let Some(rest) = remote.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        (host, port)
    } else {
        let (host, port) = remote
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        if host.contains(':') {
            return Err(invalid("too many colons in address"));
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("invalid port"))?;
    Ok((host.to_string(), port))
}

/// Result of one MX lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxOutcome {
    /// Exchanger hosts in the order the resolver returned them.
    Found(Vec<String>),
    /// The name has no MX records.
    NotFound,
    /// Transient failure; worth retrying.
    Temporary(String),
    /// The lookup timed out.
    Timeout(String),
    /// Any other failure.
    Failed(String),
}

/// Source of MX records.
pub trait MxResolver {
    /// Looks up the mail exchangers of `host`.
    fn lookup_mx(&self, host: &str) -> impl Future<Output = MxOutcome> + Send;
}

/// MX lookups through the system DNS configuration.
#[derive(Clone)]
pub struct DnsResolver {
    inner: TokioResolver,
}

impl DnsResolver {
    /// Builds a resolver from the system configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResolutionPermanent`] if the configuration cannot be
    /// read.
    pub fn from_system_conf() -> Result<Self> {
        let inner = TokioResolver::builder_tokio()
            .map_err(|e| Error::ResolutionPermanent {
                host: String::new(),
                message: format!("Failed to create resolver: {e}"),
            })?
            .build();
        Ok(Self { inner })
    }

    /// Wraps an already configured resolver.
    #[must_use]
    pub const fn new(inner: TokioResolver) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolver").finish_non_exhaustive()
    }
}

impl MxResolver for DnsResolver {
    async fn lookup_mx(&self, host: &str) -> MxOutcome {
        match self.inner.mx_lookup(host).await {
            Ok(lookup) => {
                let hosts: Vec<String> = lookup
                    .iter()
                    .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
                    .collect();
                if hosts.is_empty() {
                    MxOutcome::NotFound
                } else {
                    MxOutcome::Found(hosts)
                }
            }
            Err(e) => classify(&e),
        }
    }
}

fn classify(err: &ResolveError) -> MxOutcome {
    let message = err.to_string();
    let ResolveErrorKind::Proto(proto) = err.kind() else {
        return MxOutcome::Failed(message);
    };
    match proto.kind() {
        ProtoErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::ServFail {
                MxOutcome::Temporary(message)
            } else {
                MxOutcome::NotFound
            }
        }
        ProtoErrorKind::Timeout => MxOutcome::Timeout(message),
        ProtoErrorKind::Io(_) | ProtoErrorKind::Busy | ProtoErrorKind::NoConnections => {
            MxOutcome::Temporary(message)
        }
        _ => MxOutcome::Failed(message),
    }
}

/// Retry delays: 5 ms, doubling, capped at 1 s.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }
}

impl Backoff {
    /// Returns the delay to wait now and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_BACKOFF);
        delay
    }
}

/// Resolves `remote` into connect targets.
///
/// `max_attempts` caps lookups while DNS fails temporarily; `None` retries
/// until the failure clears.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for a malformed identifier, or a
/// resolution error for a failed lookup.
pub async fn resolve<R>(resolver: &R, remote: &str, max_attempts: Option<u32>) -> Result<Vec<Target>>
where
    R: MxResolver,
{
    let (host, port) = split_host_port(remote)?;
    let mut backoff = Backoff::default();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match resolver.lookup_mx(&host).await {
            MxOutcome::Found(exchangers) => {
                tracing::debug!(host, ?exchangers, "MX records found");
                let targets: Vec<Target> = exchangers
                    .into_iter()
                    .filter(|exchanger| !exchanger.is_empty())
                    .map(|exchanger| Target::new(exchanger, port))
                    .collect();
                if targets.is_empty() {
                    return Err(Error::ResolutionPermanent {
                        host,
                        message: "domain publishes a null MX record".into(),
                    });
                }
                return Ok(targets);
            }
            MxOutcome::NotFound => {
                tracing::debug!(host, "No MX records, using host as exchanger");
                return Ok(vec![Target::new(host, port)]);
            }
            MxOutcome::Temporary(message) => {
                if max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(Error::ResolutionTemporary {
                        host,
                        attempts,
                        message,
                    });
                }
                let delay = backoff.next_delay();
                tracing::warn!(host, attempts, ?delay, %message, "Temporary MX lookup failure");
                tokio::time::sleep(delay).await;
            }
            MxOutcome::Timeout(message) => {
                return Err(Error::ResolutionTimeout { host, message });
            }
            MxOutcome::Failed(message) => {
                return Err(Error::ResolutionPermanent { host, message });
            }
        }
    }
}

/// Dials targets in order and returns the first connection.
///
/// # Errors
///
/// Returns [`Error::ConnectFailure`] with the last dial error when every
/// target fails.
pub async fn dial(targets: &[Target], connect_timeout: Duration) -> Result<(TcpStream, Target)> {
    let mut last = None;
    for target in targets {
        let addr = target.to_string();
        match timed(connect_timeout, "connect", TcpStream::connect(addr.as_str())).await {
            Ok(stream) => {
                tracing::debug!(target = %addr, "Connected");
                return Ok((stream, target.clone()));
            }
            Err(e) => {
                tracing::warn!(target = %addr, error = %e, "Connection attempt failed");
                last = Some((addr, e));
            }
        }
    }

    let Some((target, error)) = last else {
        return Err(Error::ConnectFailure {
            target: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no connect targets"),
        });
    };
    let source = match error {
        Error::Io(e) => e,
        other => std::io::Error::new(std::io::ErrorKind::TimedOut, other.to_string()),
    };
    Err(Error::ConnectFailure { target, source })
}
