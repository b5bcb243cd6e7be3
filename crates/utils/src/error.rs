use std::io;

use thiserror::Error;

use crate::ConfigError;

/// Result type for every fallible step of a Mailform run.
pub type MailResult<T> = Result<T, MailError>;

/// Errors that terminate a Mailform run.
///
/// None of them is recoverable: the binary reports the `Display` form on a
/// single line and exits with a non-zero status.
#[derive(Debug, Error)]
pub enum MailError {
    /// The command line is missing the template path.
    #[error("usage: {0} <template> [<name>=<value> ...]")]
    Usage(String),

    /// The template could not be read or rendered.
    #[error("cannot render template: {0}")]
    Template(String),

    /// A resource resolved to empty content (missing file, failed fetch or
    /// genuinely empty resource).
    #[error("cannot attach \"{0}\"")]
    Attach(String),

    /// Either `from` or every recipient header is missing or unusable.
    #[error("missing mandatory configuration section")]
    MissingConfiguration,

    /// The relay directive names an unsupported authentication scheme.
    #[error("invalid smtp authentication scheme \"{0}\"")]
    InvalidAuthScheme(String),

    /// The relay address is not a valid `host:port` pair.
    #[error("invalid relay address \"{0}\"")]
    InvalidRelay(String),

    /// Writing a multipart section failed.
    #[error("cannot assemble message: {0}")]
    Assembly(#[source] io::Error),

    /// The SMTP relay rejected the message or the connection failed.
    #[error("smtp error: {0}")]
    Transport(String),

    /// The trust anchors for the TLS upgrade could not be loaded.
    #[error("cannot load tls configuration: {0}")]
    Tls(String),

    /// The assembled message could not be written to the output stream.
    #[error("cannot write message: {0}")]
    Output(#[source] io::Error),

    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MailError {
    /// Builds a transport error from anything printable.
    pub fn transport(message: impl ToString) -> Self {
        MailError::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_error_display() {
        assert_eq!(
            MailError::Attach("logo.png".to_string()).to_string(),
            "cannot attach \"logo.png\""
        );
        assert_eq!(
            MailError::MissingConfiguration.to_string(),
            "missing mandatory configuration section"
        );
        assert_eq!(
            MailError::InvalidAuthScheme("foo".to_string()).to_string(),
            "invalid smtp authentication scheme \"foo\""
        );
        assert_eq!(
            MailError::Usage("mailform-send".to_string()).to_string(),
            "usage: mailform-send <template> [<name>=<value> ...]"
        );
    }
}
