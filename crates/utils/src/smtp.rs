use std::{collections::HashMap, fmt, sync::Arc};

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use md5::Md5;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, rustls::pki_types::ServerName, TlsConnector};
use tracing::{debug, info, warn};

use crate::{
    load_tls_client_config, Credentials, Delivery, MailError, MailResult, SmtpConfig, Transport,
    TransportFuture,
};

type HmacMd5 = Hmac<Md5>;

/// Hosts for which `AUTH PLAIN` may run over an unencrypted connection.
const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// A (possibly multi-line) SMTP server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

/// SMTP client transport, one connection per delivery.
#[derive(Debug, Clone, Default)]
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Runs a complete SMTP session against the relay in `delivery`.
    pub async fn deliver(&self, delivery: Delivery<'_>) -> MailResult<()> {
        validate_line(&delivery.envelope.from)?;
        let recipients = delivery.envelope.sorted_recipients();
        for recipient in &recipients {
            validate_line(recipient)?;
        }

        let relay = delivery.relay;
        let stream = TcpStream::connect((relay.host.as_str(), relay.port))
            .await
            .map_err(|error| MailError::transport(format!("cannot connect to {relay}: {error}")))?;
        stream.set_nodelay(true).map_err(MailError::transport)?;
        debug!(relay = %relay, "Connected to relay");

        let mut session = Session::new(stream, false);
        session.expect(&[220]).await?;
        session.hello(&self.config.helo).await?;

        if self.config.starttls && session.supports("STARTTLS") {
            session.command("STARTTLS", &[220]).await?;
            let stream = self.upgrade(session.into_inner(), &relay.host).await?;
            info!(relay = %relay, "Upgraded connection to TLS");
            let mut session = Session::new(stream, true);
            session.hello(&self.config.helo).await?;
            return session.transact(delivery, &recipients).await;
        }
        session.transact(delivery, &recipients).await
    }

    async fn upgrade(&self, stream: TcpStream, host: &str) -> MailResult<TlsStream<TcpStream>> {
        let config = load_tls_client_config(self.config.ca_cert.as_deref())?;
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|error| MailError::Tls(format!("invalid server name \"{host}\": {error}")))?;
        connector
            .connect(server_name, stream)
            .await
            .map_err(|error| MailError::transport(format!("tls handshake failed: {error}")))
    }
}

impl Transport for SmtpTransport {
    fn send<'a>(&'a self, delivery: Delivery<'a>) -> TransportFuture<'a> {
        Box::pin(self.deliver(delivery))
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

/// Client side of a single SMTP connection.
struct Session<S> {
    stream: BufReader<S>,
    extensions: HashMap<String, String>,
    /// Set once the relay accepted `EHLO`.
    extended: bool,
    secure: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    fn new(stream: S, secure: bool) -> Self {
        Self {
            stream: BufReader::new(stream),
            extensions: HashMap::new(),
            extended: false,
            secure,
        }
    }

    fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn supports(&self, extension: &str) -> bool {
        self.extensions.contains_key(&extension.to_uppercase())
    }

    async fn read_reply(&mut self) -> MailResult<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(MailError::transport)?;
            if read == 0 {
                return Err(MailError::transport("connection closed by relay"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| MailError::transport(format!("malformed reply \"{line}\"")))?;
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if line.as_bytes().get(3) != Some(&b'-') {
                debug!(code, "< {}", lines.join(" | "));
                return Ok(Reply { code, lines });
            }
        }
    }

    async fn write_line(&mut self, line: &str, loggable: &str) -> MailResult<()> {
        debug!("> {loggable}");
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(MailError::transport)?;
        self.stream.flush().await.map_err(MailError::transport)
    }

    async fn expect(&mut self, codes: &[u16]) -> MailResult<Reply> {
        let reply = self.read_reply().await?;
        if codes.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(MailError::transport(reply))
        }
    }

    async fn command(&mut self, command: &str, codes: &[u16]) -> MailResult<Reply> {
        self.write_line(command, command).await?;
        self.expect(codes).await
    }

    /// Greets the server with `EHLO`, falling back to `HELO` for servers
    /// without extension support.
    async fn hello(&mut self, name: &str) -> MailResult<()> {
        let command = format!("EHLO {name}");
        self.write_line(&command, &command).await?;
        let reply = self.read_reply().await?;
        self.extensions.clear();
        self.extended = reply.code == 250;
        if self.extended {
            for line in reply.lines.iter().skip(1) {
                let (keyword, parameters) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                self.extensions
                    .insert(keyword.to_uppercase(), parameters.to_string());
            }
            return Ok(());
        }
        self.command(&format!("HELO {name}"), &[250]).await?;
        Ok(())
    }

    async fn authenticate(&mut self, host: &str, credentials: &Credentials) -> MailResult<()> {
        match credentials {
            Credentials::Plain {
                host: expected,
                username,
                secret,
            } => {
                check_plain(host, expected, self.secure)?;
                let response = general_purpose::STANDARD.encode(format!("\0{username}\0{secret}"));
                self.write_line(&format!("AUTH PLAIN {response}"), "AUTH PLAIN ****")
                    .await?;
                self.expect(&[235]).await?;
            }
            Credentials::CramMd5 { username, secret } => {
                let challenge = self.command("AUTH CRAM-MD5", &[334]).await?;
                let challenge = general_purpose::STANDARD
                    .decode(challenge.lines.concat().trim())
                    .map_err(|error| MailError::transport(format!("invalid challenge: {error}")))?;
                let response = cram_md5_response(username, secret, &challenge)?;
                self.write_line(&general_purpose::STANDARD.encode(response), "****")
                    .await?;
                self.expect(&[235]).await?;
            }
        }
        info!(username = credentials.username(), mechanism = credentials.mechanism(), "Authenticated");
        Ok(())
    }

    async fn transact(&mut self, delivery: Delivery<'_>, recipients: &[&str]) -> MailResult<()> {
        if let Some(credentials) = delivery.credentials {
            if self.supports("AUTH") {
                self.authenticate(&delivery.relay.host, credentials).await?;
            } else if self.extended {
                return Err(MailError::transport("relay does not support AUTH"));
            } else {
                warn!(relay = %delivery.relay, "Relay only speaks HELO, skipping authentication");
            }
        }

        let body = if self.supports("8BITMIME") {
            " BODY=8BITMIME"
        } else {
            ""
        };
        self.command(&format!("MAIL FROM:<{}>{body}", delivery.envelope.from), &[250])
            .await?;
        for recipient in recipients {
            self.command(&format!("RCPT TO:<{recipient}>"), &[250, 251, 252])
                .await?;
        }
        self.command("DATA", &[354]).await?;
        self.stream
            .write_all(&encode_data(delivery.message))
            .await
            .map_err(MailError::transport)?;
        self.stream.flush().await.map_err(MailError::transport)?;
        self.expect(&[250]).await?;
        self.command("QUIT", &[221]).await?;
        Ok(())
    }
}

/// Rejects command arguments that would inject extra protocol lines.
pub fn validate_line(value: &str) -> MailResult<()> {
    if value.contains(['\r', '\n']) {
        return Err(MailError::transport("a line must not contain CR or LF"));
    }
    Ok(())
}

/// `AUTH PLAIN` sends the secret in the clear, it only runs over TLS or
/// against a local relay, and only towards the host it was configured for.
fn check_plain(host: &str, expected: &str, secure: bool) -> MailResult<()> {
    if !secure && !LOCAL_HOSTS.contains(&host) {
        return Err(MailError::transport("unencrypted connection"));
    }
    if host != expected {
        return Err(MailError::transport("wrong host name"));
    }
    Ok(())
}

/// Computes the `user hexdigest` CRAM-MD5 response to `challenge`.
pub fn cram_md5_response(username: &str, secret: &str, challenge: &[u8]) -> MailResult<String> {
    let mut mac = HmacMd5::new_from_slice(secret.as_bytes()).map_err(MailError::transport)?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(format!("{username} {hex}"))
}

/// Prepares a message for the `DATA` phase: bare LF becomes CRLF, lines
/// starting with a dot are stuffed and the terminating `.` line is added.
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(message.len() + 8);
    let mut previous = b'\n';
    for &byte in message {
        if previous == b'\n' && byte == b'.' {
            data.push(b'.');
        }
        if byte == b'\n' && previous != b'\r' {
            data.push(b'\r');
        }
        data.push(byte);
        previous = byte;
    }
    if !data.is_empty() && !data.ends_with(b"\r\n") {
        data.extend_from_slice(b"\r\n");
    }
    data.extend_from_slice(b".\r\n");
    data
}
