use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::{Directives, MailError, MailResult};

/// Headers whose addresses make up the envelope recipients.
pub const RECIPIENT_HEADERS: [&str; 3] = ["to", "cc", "bcc"];

/// Matches the bare address at the end of a header value, either alone or
/// inside angle brackets (`Jane <jane@example.com>`).
static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*?<?(\S+?@(?:[\w-]+\.)+[\w-]{2,})>?$").expect("valid address regex")
});

/// Extracts the bare address out of a header-style value.
///
/// Returns an empty string when the value holds no address.
///
/// # Examples
///
/// ```rust
/// assert_eq!(mailform_utils::normalize_address("Jane <jane@example.com>"), "jane@example.com");
/// assert_eq!(mailform_utils::normalize_address("jane@example.com"), "jane@example.com");
/// assert_eq!(mailform_utils::normalize_address("Jane"), "");
/// ```
pub fn normalize_address(value: &str) -> String {
    ADDRESS_REGEX
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|address| address.as_str().to_string())
        .unwrap_or_default()
}

/// Splits a comma separated list of header values into normalized
/// addresses, dropping the entries without one.
pub fn normalize_address_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| normalize_address(token.trim()))
        .filter(|address| !address.is_empty())
        .collect()
}

/// Sender and recipients handed to the transport, separate from the
/// visible headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub recipients: HashSet<String>,
}

impl Envelope {
    /// Builds the envelope out of the `from`, `to`, `cc` and `bcc`
    /// directives, failing when the sender or every recipient is missing.
    pub fn from_directives(directives: &Directives) -> MailResult<Self> {
        let from = normalize_address(directives.get("from").unwrap_or_default());
        let recipients: HashSet<String> = RECIPIENT_HEADERS
            .iter()
            .filter_map(|name| directives.get(name))
            .flat_map(normalize_address_list)
            .collect();
        if from.is_empty() || recipients.is_empty() {
            return Err(MailError::MissingConfiguration);
        }
        Ok(Self { from, recipients })
    }

    /// Returns the recipients in a stable order.
    pub fn sorted_recipients(&self) -> Vec<&str> {
        let mut recipients: Vec<&str> = self.recipients.iter().map(String::as_str).collect();
        recipients.sort_unstable();
        recipients
    }

    /// Domain of the sender address.
    pub fn sender_domain(&self) -> &str {
        self.from
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost")
    }
}
