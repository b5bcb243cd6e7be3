use std::{collections::HashMap, io::Write, path::Path};

use chrono::Local;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    assemble_message, dispatch, extract_directives, render_template_file, rewrite_inline,
    Attachment, Config, Directives, Dispatch, Envelope, Extraction, MailResult, RelaySpec,
    ResourceFetcher, RunContext, Transport,
};

/// A fully assembled message together with its delivery parameters.
#[derive(Debug, Clone)]
pub struct Composed {
    pub message: Vec<u8>,
    pub envelope: Envelope,
    /// Parsed relay directive, `None` when the message is to be printed.
    pub relay: Option<RelaySpec>,
}

/// Turns rendered templates into messages and hands them over for
/// dispatch, one template run per instance.
pub struct Mailer<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    fetcher: ResourceFetcher,
    context: RunContext,
}

impl<'a> Mailer<'a> {
    pub fn new(config: &'a Config, transport: &'a dyn Transport) -> MailResult<Self> {
        Self::with_context(config, transport, RunContext::new())
    }

    pub fn with_context(
        config: &'a Config,
        transport: &'a dyn Transport,
        context: RunContext,
    ) -> MailResult<Self> {
        Ok(Self {
            config,
            transport,
            fetcher: ResourceFetcher::new(config.fetch.timeout())?,
            context,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Renders the template at `path`, composes the message and dispatches
    /// it.
    pub async fn run<W: Write>(
        &self,
        path: &Path,
        placeholders: &HashMap<String, String>,
        output: &mut W,
    ) -> MailResult<Dispatch> {
        let rendered = render_template_file(path, placeholders).await?;
        let composed = self.compose(&rendered).await?;
        self.send(&composed, output).await
    }

    /// Builds the message out of a rendered template.
    ///
    /// Configuration problems (missing sender or recipients, an invalid
    /// relay directive) are reported before any resource is fetched.
    pub async fn compose(&self, rendered: &str) -> MailResult<Composed> {
        let Extraction {
            mut directives,
            template,
        } = extract_directives(rendered);
        let envelope = Envelope::from_directives(&directives)?;
        directives.remove("bcc");
        let relay = directives
            .relay()
            .map(str::parse::<RelaySpec>)
            .transpose()?;
        self.stamp(&mut directives, &envelope);

        let rewrite = rewrite_inline(&template, &self.fetcher, &self.context).await?;
        let mut attachments = Vec::with_capacity(directives.attachments().len());
        for location in directives.attachments() {
            let resource = self.fetcher.fetch(location).await?;
            attachments.push(Attachment::regular(&resource));
        }

        let message = assemble_message(
            &directives,
            &rewrite.template,
            &rewrite.attachments,
            &attachments,
            &self.context,
        )?;
        info!(
            token = %self.context.token(),
            from = %envelope.from,
            recipients = envelope.recipients.len(),
            inline = rewrite.attachments.len(),
            attachments = attachments.len(),
            size = message.len(),
            "Composed message"
        );
        Ok(Composed {
            message,
            envelope,
            relay,
        })
    }

    /// Prints or relays a composed message.
    pub async fn send<W: Write>(&self, composed: &Composed, output: &mut W) -> MailResult<Dispatch> {
        dispatch(
            composed.relay.as_ref(),
            &composed.envelope,
            &composed.message,
            self.transport,
            output,
        )
        .await
    }

    /// Adds the generated headers the template left out.
    fn stamp(&self, directives: &mut Directives, envelope: &Envelope) {
        if self.config.message.date && !directives.contains("date") {
            directives.insert("date", &Local::now().to_rfc2822());
        }
        if self.config.message.message_id && !directives.contains("message-id") {
            let id = format!("<{}@{}>", Uuid::new_v4(), envelope.sender_domain());
            debug!(message_id = %id, "Generated message id");
            directives.insert("message-id", &id);
        }
    }
}
