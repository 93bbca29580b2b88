//! Session configuration types.

use std::sync::Arc;
use std::time::Duration;

/// Local identifier sent in EHLO/HELO when none is configured.
pub const DEFAULT_LOCAL_NAME: &str = "localhost";

/// Transport security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Stay on plaintext for the whole session.
    #[default]
    None,
    /// Upgrade with STARTTLS when the server advertises it.
    StartTls,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier sent in EHLO/HELO.
    pub local_name: String,
    /// Security mode.
    pub security: Security,
    /// TLS client configuration used for STARTTLS (webpki roots when unset).
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Timeout for each TCP dial.
    pub connect_timeout: Duration,
    /// Timeout for each command write and reply read.
    pub io_timeout: Duration,
    /// Maximum MX lookups while DNS fails temporarily (`None` retries forever).
    pub resolve_attempts: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            security: Security::None,
            tls: None,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            resolve_attempts: None,
        }
    }
}

impl Config {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the EHLO/HELO identifier.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.config.local_name = name.into();
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.config.security = security;
        self
    }

    /// Opts into STARTTLS.
    #[must_use]
    pub const fn starttls(self) -> Self {
        self.security(Security::StartTls)
    }

    /// Sets the TLS client configuration.
    #[must_use]
    pub fn tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.config.tls = Some(tls);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Caps MX lookups during temporary DNS failures.
    #[must_use]
    pub const fn resolve_attempts(mut self, attempts: u32) -> Self {
        self.config.resolve_attempts = Some(attempts);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.local_name, "localhost");
        assert_eq!(config.security, Security::None);
        assert!(config.tls.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.io_timeout, Duration::from_secs(60));
        assert_eq!(config.resolve_attempts, None);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .local_name("client.example.org")
            .starttls()
            .connect_timeout(Duration::from_secs(5))
            .io_timeout(Duration::from_secs(10))
            .resolve_attempts(3)
            .build();

        assert_eq!(config.local_name, "client.example.org");
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.resolve_attempts, Some(3));
    }
}
