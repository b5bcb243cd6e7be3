use std::collections::BTreeMap;

use crate::{detect_content_type, encode_base64_wrapped, file_stem, Resource, RunContext};

/// Header fields of a MIME part, kept sorted by name.
pub type PartHeaders = BTreeMap<String, String>;

/// A base64 encoded MIME part built out of a fetched [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub headers: PartHeaders,
    pub body: Vec<u8>,
    /// Content identifier, without angle brackets, set for inline parts.
    pub content_id: Option<String>,
}

impl Attachment {
    /// Builds an inline part with a fresh content identifier from `context`.
    pub fn inline(resource: &Resource, context: &RunContext) -> Self {
        let id = context.content_id();
        let mut attachment = Self::encode(
            resource,
            format!("inline; size={}", resource.content.len()),
        );
        attachment
            .headers
            .insert("Content-ID".into(), format!("<{id}>"));
        attachment.content_id = Some(id);
        attachment
    }

    /// Builds a regular, downloadable attachment part.
    pub fn regular(resource: &Resource) -> Self {
        Self::encode(
            resource,
            format!(
                "attachment; filename=\"{}\"; size={}",
                resource.name,
                resource.content.len()
            ),
        )
    }

    fn encode(resource: &Resource, disposition: String) -> Self {
        let mut headers = PartHeaders::new();
        headers.insert("Content-Transfer-Encoding".into(), "base64".into());
        headers.insert(
            "Content-Type".into(),
            detect_content_type(&resource.content, &resource.name),
        );
        headers.insert(
            "Content-Description".into(),
            file_stem(&resource.name).to_string(),
        );
        headers.insert("Content-Disposition".into(), disposition);
        Self {
            headers,
            body: encode_base64_wrapped(&resource.content),
            content_id: None,
        }
    }
}
