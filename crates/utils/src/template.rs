//! Template rendering, treated as a black box by the rest of the pipeline.
//!
//! Templates use the `minijinja` syntax (`{{ name }}`) and are rendered
//! verbatim: HTML escaping is disabled since directive values and markup
//! come from the template author, and the trailing newline is kept.

use std::{collections::HashMap, path::Path};

use minijinja::{AutoEscape, Environment};
use tracing::debug;

use crate::{MailError, MailResult};

/// Builds the placeholder bindings from `name=value` command line arguments.
///
/// Both sides are trimmed, arguments without `=` or with an empty side are
/// dropped silently. A repeated name keeps its last value.
pub fn parse_placeholders<I, S>(arguments: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut placeholders = HashMap::new();
    for argument in arguments {
        if let Some((name, value)) = argument.as_ref().split_once('=') {
            let (name, value) = (name.trim(), value.trim());
            if !name.is_empty() && !value.is_empty() {
                placeholders.insert(name.to_string(), value.to_string());
            }
        }
    }
    placeholders
}

/// Renders a template source with the given placeholder bindings.
pub fn render_template(
    name: &str,
    source: &str,
    placeholders: &HashMap<String, String>,
) -> MailResult<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.render_named_str(name, source, placeholders)
        .map_err(|e| MailError::Template(e.to_string()))
}

/// Reads and renders the template file at `path`.
pub async fn render_template_file(
    path: &Path,
    placeholders: &HashMap<String, String>,
) -> MailResult<String> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MailError::Template(format!("{}: {e}", path.display())))?;
    debug!(
        path = %path.display(),
        placeholders = placeholders.len(),
        "Rendering template"
    );
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".to_string());
    render_template(&name, &source, placeholders)
}
