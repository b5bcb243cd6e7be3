//! Hand-off of assembled messages to a mail relay.
//!
//! The [`Transport`] trait is the seam between message preparation and the
//! network: [`SmtpTransport`](crate::SmtpTransport) talks to a real relay,
//! tests plug in recording implementations.

use std::{fmt, future::Future, pin::Pin};

use crate::{Envelope, MailResult, RelayAddress};

/// Boxed future type for transport operations, enabling object safety.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = MailResult<()>> + Send + 'a>>;

/// Credentials presented to the relay.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `AUTH PLAIN`, bound to the relay host it was configured for.
    Plain {
        host: String,
        username: String,
        secret: String,
    },
    /// `AUTH CRAM-MD5` challenge-response.
    CramMd5 { username: String, secret: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::Plain { username, .. } | Credentials::CramMd5 { username, .. } => username,
        }
    }

    pub fn mechanism(&self) -> &'static str {
        match self {
            Credentials::Plain { .. } => "PLAIN",
            Credentials::CramMd5 { .. } => "CRAM-MD5",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Plain { host, username, .. } => f
                .debug_struct("Plain")
                .field("host", host)
                .field("username", username)
                .field("secret", &"[REDACTED]")
                .finish(),
            Credentials::CramMd5 { username, .. } => f
                .debug_struct("CramMd5")
                .field("username", username)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Everything a transport needs to deliver one message.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub relay: &'a RelayAddress,
    pub credentials: Option<&'a Credentials>,
    pub envelope: &'a Envelope,
    pub message: &'a [u8],
}

/// Trait for transports that deliver fully-formed messages to a relay.
pub trait Transport: Send + Sync {
    /// Delivers the message described by `delivery`.
    fn send<'a>(&'a self, delivery: Delivery<'a>) -> TransportFuture<'a>;

    /// Returns the name of this transport.
    fn name(&self) -> &str;
}
