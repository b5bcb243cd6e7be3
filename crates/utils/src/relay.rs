use std::{fmt, io::Write, str::FromStr};

use tracing::info;

use crate::{Credentials, Delivery, Envelope, MailError, MailResult, Transport};

/// Separator between the authentication segment and the relay address.
const AUTH_SEPARATOR: char = '|';

/// Authentication schemes accepted in the relay directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `plain`, SMTP `AUTH PLAIN`.
    Plain,
    /// `md5`, SMTP `AUTH CRAM-MD5`.
    CramMd5,
}

impl FromStr for AuthScheme {
    type Err = MailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let scheme = value.trim().to_lowercase();
        match scheme.as_str() {
            "plain" => Ok(AuthScheme::Plain),
            "md5" => Ok(AuthScheme::CramMd5),
            _ => Err(MailError::InvalidAuthScheme(scheme)),
        }
    }
}

/// Host and port of an SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for RelayAddress {
    type Err = MailError;

    /// Parses `host:port`, with IPv6 hosts enclosed in brackets
    /// (`[::1]:25`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MailError::InvalidRelay(value.to_string());
        let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
            None if host.contains(':') || host.contains(']') => return Err(invalid()),
            None => host,
        };
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parsed `[scheme:user:secret|]host:port` relay directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySpec {
    pub address: RelayAddress,
    pub credentials: Option<Credentials>,
}

impl FromStr for RelaySpec {
    type Err = MailError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut segments = value.split(AUTH_SEPARATOR);
        let first = segments.next().unwrap_or_default();
        let (auth, address) = match segments.next() {
            Some(address) => (Some(first), address),
            None => (None, first),
        };

        let address: RelayAddress = address.trim().parse()?;
        let credentials = match auth.map(|auth| auth.splitn(3, ':').collect::<Vec<_>>()) {
            Some(fields) if fields.len() == 3 => {
                let username = fields[1].trim().to_string();
                let secret = fields[2].trim().to_string();
                Some(match fields[0].parse::<AuthScheme>()? {
                    AuthScheme::Plain => Credentials::Plain {
                        host: address.host.clone(),
                        username,
                        secret,
                    },
                    AuthScheme::CramMd5 => Credentials::CramMd5 { username, secret },
                })
            }
            _ => None,
        };

        Ok(Self {
            address,
            credentials,
        })
    }
}

/// Outcome of [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No relay configured, the message went to the output stream.
    Printed,
    /// The message was handed to the relay.
    Sent,
}

/// Prints the message when no relay is configured, otherwise delivers it
/// through `transport`.
pub async fn dispatch<W: Write>(
    relay: Option<&RelaySpec>,
    envelope: &Envelope,
    message: &[u8],
    transport: &dyn Transport,
    output: &mut W,
) -> MailResult<Dispatch> {
    let Some(relay) = relay else {
        output.write_all(message).map_err(MailError::Output)?;
        output.write_all(b"\n").map_err(MailError::Output)?;
        output.flush().map_err(MailError::Output)?;
        return Ok(Dispatch::Printed);
    };

    info!(
        relay = %relay.address,
        transport = transport.name(),
        mechanism = relay.credentials.as_ref().map(Credentials::mechanism).unwrap_or("none"),
        recipients = envelope.recipients.len(),
        "Dispatching message"
    );
    transport
        .send(Delivery {
            relay: &relay.address,
            credentials: relay.credentials.as_ref(),
            envelope,
            message,
        })
        .await?;
    info!(relay = %relay.address, "Message sent");
    Ok(Dispatch::Sent)
}
