use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{Attachment, MailResult, ResourceFetcher, RunContext};

/// Matches resource references: any ` src="..."` attribute and the `href`
/// of `<link ...>` elements, single or double quoted.
static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?: src=["']([^"']+)["']|<link .+?href=["']([^"']+)["'])"#)
        .expect("valid reference regex")
});

/// Template whose resource references point at inline attachments.
#[derive(Debug, Clone)]
pub struct InlineRewrite {
    pub template: String,
    /// Inline parts, in order of appearance in the template.
    pub attachments: Vec<Attachment>,
}

/// Fetches every resource referenced by `template` and rewrites each
/// reference into `cid:<content-id>`.
///
/// References are handled left to right; everything outside the replaced
/// values is copied verbatim. The first resource that cannot be attached
/// aborts the whole rewrite.
pub async fn rewrite_inline(
    template: &str,
    fetcher: &ResourceFetcher,
    context: &RunContext,
) -> MailResult<InlineRewrite> {
    let mut output = String::with_capacity(template.len());
    let mut attachments = Vec::new();
    let mut start = 0;

    for captures in REFERENCE_REGEX.captures_iter(template) {
        let Some(reference) = captures.get(1).or_else(|| captures.get(2)) else {
            continue;
        };
        let resource = fetcher.fetch(reference.as_str()).await?;
        let attachment = Attachment::inline(&resource, context);
        let id = attachment.content_id.as_deref().unwrap_or_default();
        debug!(reference = %reference.as_str(), content_id = %id, "Inlining resource");

        output.push_str(&template[start..reference.start()]);
        output.push_str("cid:");
        output.push_str(id);
        start = reference.end();
        attachments.push(attachment);
    }
    output.push_str(&template[start..]);

    Ok(InlineRewrite {
        template: output,
        attachments,
    })
}
