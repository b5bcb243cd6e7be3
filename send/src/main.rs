use mailform_utils::{
    discover_config, parse_placeholders, MailError, MailResult, Mailer, SmtpTransport,
};
use std::{env, io, path::Path, process::ExitCode};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set, only warnings reach standard
/// error next to the fatal error line.
const DEFAULT_FILTER: &str = "warn";

/// Program name reported in the usage line when `argv[0]` is missing.
const DEFAULT_PROGRAM: &str = "mailform-send";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();
    match run(env::args()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Runs a single template: `<program> <template> [<name>=<value> ...]`.
async fn run(mut arguments: impl Iterator<Item = String>) -> MailResult<()> {
    let program = arguments
        .next()
        .as_deref()
        .map(program_name)
        .unwrap_or_else(|| DEFAULT_PROGRAM.to_string());
    let Some(template) = arguments.next() else {
        return Err(MailError::Usage(program));
    };
    let placeholders = parse_placeholders(arguments);

    let config = discover_config()?;
    let transport = SmtpTransport::new(config.smtp.clone());
    let mailer = Mailer::new(&config, &transport)?;
    debug!(template = %template, token = %mailer.context().token(), "Starting run");

    let outcome = mailer
        .run(Path::new(&template), &placeholders, &mut io::stdout())
        .await?;
    debug!(outcome = ?outcome, "Run complete");
    Ok(())
}

fn program_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[tokio::test]
    async fn test_run_without_template() {
        let error = run(arguments(&["/usr/local/bin/mailform-send"]))
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "usage: mailform-send <template> [<name>=<value> ...]"
        );

        let error = run(arguments(&[])).await.unwrap_err();
        assert!(matches!(error, MailError::Usage(ref program) if program == DEFAULT_PROGRAM));
    }

    #[tokio::test]
    async fn test_run_missing_template_file() {
        let error = run(arguments(&["mailform-send", "/nonexistent/mail.html", "name=Jane"]))
            .await
            .unwrap_err();
        assert!(matches!(error, MailError::Template(_)));
        assert!(error.to_string().contains("/nonexistent/mail.html"));
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name("/usr/bin/mailform-send"), "mailform-send");
        assert_eq!(program_name("mailform-send"), "mailform-send");
    }
}
