//! SMTP command builder.

use crate::error::{Error, Result};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: String,
        /// Append `BODY=8BITMIME`
        eight_bit_mime: bool,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

/// Rejects text that would end the command line early.
///
/// # Errors
///
/// Returns [`Error::LineInjection`] if `line` contains CR or LF.
pub fn validate_line(line: &str) -> Result<()> {
    if line.contains(['\r', '\n']) {
        return Err(Error::LineInjection);
    }
    Ok(())
}

impl Command {
    /// Returns the command line without the CRLF terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineInjection`] if any argument contains CR or LF.
    pub fn line(&self) -> Result<String> {
        let line = match self {
            Self::Helo { hostname } => {
                validate_line(hostname)?;
                format!("HELO {hostname}")
            }
            Self::Ehlo { hostname } => {
                validate_line(hostname)?;
                format!("EHLO {hostname}")
            }
            Self::StartTls => "STARTTLS".to_string(),
            Self::MailFrom {
                from,
                eight_bit_mime,
            } => {
                validate_line(from)?;
                if *eight_bit_mime {
                    format!("MAIL FROM:<{from}> BODY=8BITMIME")
                } else {
                    format!("MAIL FROM:<{from}>")
                }
            }
            Self::RcptTo { to } => {
                validate_line(to)?;
                format!("RCPT TO:<{to}>")
            }
            Self::Data => "DATA".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        Ok(line)
    }

    /// Serializes the command to bytes, CRLF included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineInjection`] if any argument contains CR or LF.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = self.line()?.into_bytes();
        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_helo_command() {
        let cmd = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize().unwrap(), b"HELO client.example.com\r\n");
    }

    #[test]
    fn test_ehlo_command() {
        let cmd = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(cmd.serialize().unwrap(), b"EHLO localhost\r\n");
    }

    #[test]
    fn test_starttls_command() {
        assert_eq!(Command::StartTls.serialize().unwrap(), b"STARTTLS\r\n");
    }

    #[test]
    fn test_mail_from_simple() {
        let cmd = Command::MailFrom {
            from: "a@x.com".to_string(),
            eight_bit_mime: false,
        };
        assert_eq!(cmd.serialize().unwrap(), b"MAIL FROM:<a@x.com>\r\n");
    }

    #[test]
    fn test_mail_from_8bitmime() {
        let cmd = Command::MailFrom {
            from: "a@x.com".to_string(),
            eight_bit_mime: true,
        };
        assert_eq!(
            cmd.serialize().unwrap(),
            b"MAIL FROM:<a@x.com> BODY=8BITMIME\r\n"
        );
    }

    #[test]
    fn test_rcpt_to_command() {
        let cmd = Command::RcptTo {
            to: "b@y.com".to_string(),
        };
        assert_eq!(cmd.serialize().unwrap(), b"RCPT TO:<b@y.com>\r\n");
    }

    #[test]
    fn test_data_and_quit() {
        assert_eq!(Command::Data.serialize().unwrap(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize().unwrap(), b"QUIT\r\n");
    }

    #[test]
    fn test_rejects_injected_lines() {
        let cases = [
            Command::Ehlo {
                hostname: "evil\r\nMAIL FROM:<x@y>".to_string(),
            },
            Command::Helo {
                hostname: "evil\n".to_string(),
            },
            Command::MailFrom {
                from: "a@x.com\r".to_string(),
                eight_bit_mime: false,
            },
            Command::RcptTo {
                to: "b@y.com>\r\nDATA".to_string(),
            },
        ];
        for cmd in cases {
            assert!(matches!(cmd.serialize(), Err(Error::LineInjection)), "{cmd:?}");
        }
    }
}
