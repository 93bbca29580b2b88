//! Server capabilities advertised in the EHLO reply.

use std::collections::HashMap;

use super::Reply;

/// Extension name for the TLS upgrade command.
pub const STARTTLS: &str = "STARTTLS";
/// Extension name for 8-bit MIME transport.
pub const EIGHT_BIT_MIME: &str = "8BITMIME";
/// Extension name for authentication.
pub const AUTH: &str = "AUTH";

/// Extensions and authentication mechanisms from an EHLO reply.
///
/// Keys are kept exactly as the server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    extensions: HashMap<String, String>,
    auth: Vec<String>,
}

impl Capabilities {
    /// Creates an empty capability set (the state after a HELO fallback).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds capabilities from a successful EHLO reply.
    ///
    /// The first reply line is the server greeting; every following line
    /// becomes one extension entry.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        Self::parse(reply.lines.iter().skip(1).map(String::as_str))
    }

    /// Parses extension lines (without the greeting line).
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut extensions = HashMap::new();
        for line in lines {
            let (name, params) = line.split_once(' ').unwrap_or((line, ""));
            if name.is_empty() {
                continue;
            }
            extensions.insert(name.to_string(), params.to_string());
        }

        let auth = extensions
            .get(AUTH)
            .map(|params| params.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self { extensions, auth }
    }

    /// Checks if the server advertised an extension.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    /// Returns the parameter string of an extension (`""` if it has none).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(STARTTLS)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(EIGHT_BIT_MIME)
    }

    /// Returns advertised authentication mechanisms in server order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth
    }

    /// Returns the number of advertised extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns true if no extension was advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Iterates over `(name, params)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extensions
            .iter()
            .map(|(name, params)| (name.as_str(), params.as_str()))
    }
}
