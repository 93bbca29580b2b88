//! Message header mapping.

use crate::command::validate_line;
use crate::error::{Error, Result};

/// Header fields of an outgoing message.
///
/// Keys are stored in canonical form (`x-note` becomes `X-Note`) and are
/// unique regardless of case. Each key holds its values in insertion
/// order, and keys are written in the order they were first added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(String, Vec<String>)>,
}

impl Header {
    /// Creates an empty header mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, keeping existing values for the key.
    pub fn add(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = canonical_key(key.as_ref());
        let value = value.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Sets a value, replacing existing values for the key.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = canonical_key(key.as_ref());
        let value = value.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Gets the first value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// Gets all values for a key.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.position(&canonical_key(key))
            .map_or(&[], |i| self.entries[i].1.as_slice())
    }

    /// Removes all values for a key.
    pub fn remove(&mut self, key: &str) {
        let key = canonical_key(key);
        self.entries.retain(|(k, _)| *k != key);
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Writes every field in wire format.
    ///
    /// # Errors
    ///
    /// Returns an error if a key fails [`validate_field_name`].
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.write_subset(out, &[])
    }

    /// Writes every field except the keys listed in `exclude`.
    ///
    /// Values are sanitized with [`sanitize_value`]. No blank line is
    /// written after the fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a key fails [`validate_field_name`].
    pub fn write_subset(&self, out: &mut Vec<u8>, exclude: &[&str]) -> Result<()> {
        for (key, values) in &self.entries {
            if exclude.iter().any(|x| canonical_key(x) == *key) {
                continue;
            }
            for value in values {
                write_field(out, key, value)?;
            }
        }
        Ok(())
    }

    fn position(&self, canonical: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == canonical)
    }
}

/// Writes one `Key: value\r\n` line with a sanitized value.
pub(crate) fn write_field(out: &mut Vec<u8>, key: &str, value: &str) -> Result<()> {
    validate_field_name(key)?;
    let value = sanitize_value(value);
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
    Ok(())
}

/// Checks that `key` is an RFC 5322 field name: one or more printable
/// ASCII characters other than `:`.
///
/// # Errors
///
/// Returns [`Error::LineInjection`] if `key` contains CR or LF, and
/// [`Error::InvalidHeaderName`] for any other invalid name.
pub fn validate_field_name(key: &str) -> Result<()> {
    validate_line(key)?;
    if key.is_empty() || !key.bytes().all(|b| (33..=126).contains(&b) && b != b':') {
        return Err(Error::InvalidHeaderName(key.to_string()));
    }
    Ok(())
}

/// Replaces CR and LF with spaces and trims surrounding whitespace.
#[must_use]
pub fn sanitize_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

/// Returns the canonical form of a header key.
///
/// The first letter and any letter after a hyphen are upper-cased, the
/// rest lower-cased. Keys with characters outside the RFC 7230 token set
/// are returned unchanged.
#[must_use]
pub fn canonical_key(key: &str) -> String {
    if key.is_empty() || !key.bytes().all(is_token_byte) {
        return key.to_string();
    }
    let mut upper = true;
    key.chars()
        .map(|c| {
            let c = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            c
        })
        .collect()
}

const fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}
