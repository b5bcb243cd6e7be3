use std::fmt::Write;

use rand::{distributions::Alphanumeric, Rng};

/// Length of the random tokens used for the run token and content ids.
const TOKEN_LENGTH: usize = 12;

/// Number of random bytes behind a multipart boundary (hex encoded).
const BOUNDARY_BYTES: usize = 30;

/// State shared by every step of a single template run.
///
/// The run token namespaces the content identifiers of inline attachments,
/// so two resources of the same message never collide while separate runs
/// stay independent of each other.
#[derive(Debug, Clone)]
pub struct RunContext {
    token: String,
}

impl RunContext {
    /// Creates a context with a freshly generated run token.
    pub fn new() -> Self {
        Self {
            token: random_token(TOKEN_LENGTH),
        }
    }

    /// Creates a context around a known run token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Generates a new content identifier, `<random>@<run token>`, without
    /// the surrounding angle brackets.
    pub fn content_id(&self) -> String {
        format!("{}@{}", random_token(TOKEN_LENGTH), self.token)
    }

    /// Generates a new multipart boundary.
    pub fn boundary(&self) -> String {
        let mut bytes = [0u8; BOUNDARY_BYTES];
        rand::thread_rng().fill(&mut bytes[..]);
        bytes.iter().fold(String::new(), |mut output, byte| {
            let _ = write!(output, "{byte:02x}");
            output
        })
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates an alphanumeric token of `size` characters (at least one).
pub fn random_token(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size.max(1))
        .map(char::from)
        .collect()
}
