//! # mxsend
//!
//! An SMTP submission client implementing the client side of RFC 5321.
//!
//! ## Features
//!
//! - **MX delivery**: the remote domain is resolved through its MX records,
//!   falling back to the host itself when it has none
//! - **Capability negotiation**: EHLO with HELO fallback, 8BITMIME
//! - **STARTTLS**: opt-in in-place TLS upgrade with rustls
//! - **Safe framing**: CR/LF injection checks, dot-stuffed DATA, timeouts
//!   on every read, write and dial
//!
//! ## Quick Start
//!
//! ```ignore
//! use mxsend::{Config, Message, Security, Session};
//!
//! #[tokio::main]
//! async fn main() -> mxsend::Result<()> {
//!     let config = Config::builder()
//!         .local_name("client.example.org")
//!         .security(Security::StartTls)
//!         .build();
//!     let mut session = Session::with_config("example.com:25", config)?;
//!
//!     let mut message = Message::new("sender@example.org")
//!         .to("recipient@example.com")
//!         .subject("Test")
//!         .header("X-Mailer", "mxsend")
//!         .body("Hello, World!\r\n");
//!
//!     session.send(&mut message).await
//! }
//! ```
//!
//! ## Session Flow
//!
//! ```text
//! resolve ─→ dial ─→ 220 ─→ EHLO (HELO) ─→ [STARTTLS ─→ EHLO (HELO)]
//!                                                │
//!                 QUIT ←─ . ←─ DATA ←─ RCPT* ←─ MAIL
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command lines
//! - [`connection`]: Streams, framing layer and STARTTLS upgrade
//! - [`message`]: Message model and header serialization
//! - [`parser`]: Reply parser
//! - [`resolver`]: MX resolution and dialing
//! - [`types`]: Replies and capabilities

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod message;
pub mod parser;
pub mod resolver;
mod session;
pub mod types;

pub use connection::{Config, ConfigBuilder, Security};
pub use error::{Error, Result};
pub use message::{Body, Header, Message};
pub use resolver::{DnsResolver, MxOutcome, MxResolver, Target};
pub use session::Session;
pub use types::{Capabilities, Expect, Reply, ReplyCode};
