//! Core SMTP types.

mod capability;
mod reply;

pub use capability::{AUTH, Capabilities, EIGHT_BIT_MIME, STARTTLS};
pub use reply::{Expect, Reply, ReplyCode};
