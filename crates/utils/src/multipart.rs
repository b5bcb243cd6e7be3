//! Assembly of the final message: a `multipart/mixed` body whose first part
//! is a `multipart/related` section holding the HTML body and its inline
//! resources, followed by the regular attachments.

use std::{
    io::{self, Write},
    sync::LazyLock,
};

use regex::Regex;
use tracing::debug;

use crate::{Attachment, Directives, MailError, MailResult, PartHeaders, RunContext, TEXT_HTML_UTF8};

/// Writes the parts of a single multipart body separated by `boundary`.
#[derive(Debug)]
pub struct MultipartWriter<W: Write> {
    writer: W,
    boundary: String,
    parts: usize,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(writer: W, boundary: impl Into<String>) -> Self {
        Self {
            writer,
            boundary: boundary.into(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Writes a delimiter, the part headers in name order, a blank line and
    /// the part body.
    pub fn write_part(&mut self, headers: &PartHeaders, body: &[u8]) -> io::Result<()> {
        if self.parts == 0 {
            write!(self.writer, "--{}\r\n", self.boundary)?;
        } else {
            write!(self.writer, "\r\n--{}\r\n", self.boundary)?;
        }
        for (name, value) in headers {
            write!(self.writer, "{name}: {value}\r\n")?;
        }
        self.writer.write_all(b"\r\n")?;
        self.writer.write_all(body)?;
        self.parts += 1;
        Ok(())
    }

    /// Writes the closing delimiter and hands back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.parts > 0 {
            self.writer.write_all(b"\r\n")?;
        }
        write!(self.writer, "--{}--\r\n", self.boundary)?;
        Ok(self.writer)
    }
}

/// Headers emitted at the top level of the message, never derived from the
/// configuration.
const HIDDEN_HEADERS: [&str; 1] = ["bcc"];

/// Header names whose canonical spelling is not a plain capitalization.
const CANONICAL_NAMES: [(&str, &str); 2] = [
    ("message-id", "Message-ID"),
    ("mime-version", "MIME-Version"),
];

/// Line breaks together with the blanks around them.
static LINE_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\r\n]\s*").expect("valid line break regex"));

/// Capitalizes the first character of a directive name (`subject` becomes
/// `Subject`, `reply-to` becomes `Reply-to`), well-known names keep their
/// canonical spelling (`Message-ID`).
pub fn header_name(name: &str) -> String {
    if let Some((_, canonical)) = CANONICAL_NAMES.iter().find(|(known, _)| *known == name) {
        return canonical.to_string();
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Collapses every line break of a directive value into a single space, so
/// a value always stays on its header line.
pub fn unfold_value(value: &str) -> String {
    LINE_BREAK_REGEX.replace_all(value, " ").into_owned()
}

/// Builds the top-level header block, ending with the blank line.
pub fn build_headers(directives: &Directives, mixed_boundary: &str) -> Vec<u8> {
    let mut headers = Vec::new();
    for (name, value) in directives.entries() {
        if HIDDEN_HEADERS.contains(&name) {
            continue;
        }
        headers.extend_from_slice(
            format!("{}: {}\r\n", header_name(name), unfold_value(value)).as_bytes(),
        );
    }
    headers.extend_from_slice(
        format!("Content-Type: multipart/mixed; boundary={mixed_boundary}\r\n").as_bytes(),
    );
    headers.extend_from_slice(b"MIME-Version: 1.0\r\n");
    headers.extend_from_slice(b"\r\n");
    headers
}

/// Builds the `multipart/related` section: the HTML body followed by the
/// inline parts in discovery order.
pub fn build_related(html: &str, inline: &[Attachment], boundary: &str) -> MailResult<Vec<u8>> {
    let mut writer = MultipartWriter::new(Vec::new(), boundary);
    let mut headers = PartHeaders::new();
    headers.insert("Content-Type".into(), TEXT_HTML_UTF8.into());
    writer
        .write_part(&headers, html.as_bytes())
        .map_err(MailError::Assembly)?;
    for attachment in inline {
        writer
            .write_part(&attachment.headers, &attachment.body)
            .map_err(MailError::Assembly)?;
    }
    writer.finish().map_err(MailError::Assembly)
}

/// Builds the complete message, headers followed by the `multipart/mixed`
/// body.
pub fn assemble_message(
    directives: &Directives,
    html: &str,
    inline: &[Attachment],
    attachments: &[Attachment],
    context: &RunContext,
) -> MailResult<Vec<u8>> {
    let mixed_boundary = context.boundary();
    let related_boundary = context.boundary();

    let related = build_related(html, inline, &related_boundary)?;

    let mut message = build_headers(directives, &mixed_boundary);
    let mut writer = MultipartWriter::new(&mut message, mixed_boundary);
    let mut headers = PartHeaders::new();
    headers.insert(
        "Content-Type".into(),
        format!("multipart/related; boundary={related_boundary}"),
    );
    writer
        .write_part(&headers, &related)
        .map_err(MailError::Assembly)?;
    for attachment in attachments {
        writer
            .write_part(&attachment.headers, &attachment.body)
            .map_err(MailError::Assembly)?;
    }
    writer.finish().map_err(MailError::Assembly)?;

    debug!(
        size = message.len(),
        inline = inline.len(),
        attachments = attachments.len(),
        "Assembled message"
    );
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mime::tests::split_message, Resource};

    fn directives(entries: &[(&str, &str)]) -> Directives {
        let mut directives = Directives::new();
        for (name, value) in entries {
            directives.apply(name, value);
        }
        directives
    }

    fn boundary_of(content_type: &str) -> &str {
        content_type.split_once("boundary=").unwrap().1
    }

    /// Writer failing after `budget` bytes.
    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "full"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_multipart_writer_layout() {
        let mut writer = MultipartWriter::new(Vec::new(), "XYZ");
        let mut headers = PartHeaders::new();
        headers.insert("Content-Type".into(), "text/plain".into());
        headers.insert("Content-Description".into(), "a".into());
        writer.write_part(&headers, b"one").unwrap();
        writer.write_part(&PartHeaders::new(), b"two").unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(
            output,
            "--XYZ\r\nContent-Description: a\r\nContent-Type: text/plain\r\n\r\none\
             \r\n--XYZ\r\n\r\ntwo\r\n--XYZ--\r\n"
        );
    }

    #[test]
    fn test_multipart_writer_without_parts() {
        let writer = MultipartWriter::new(Vec::new(), "B");
        assert_eq!(writer.boundary(), "B");
        assert_eq!(writer.finish().unwrap(), b"--B--\r\n");
    }

    #[test]
    fn test_multipart_writer_failure() {
        let mut writer = MultipartWriter::new(FailingWriter { budget: 8 }, "boundary");
        assert!(writer.write_part(&PartHeaders::new(), b"body").is_err());
    }

    #[test]
    fn test_header_name() {
        assert_eq!(header_name("subject"), "Subject");
        assert_eq!(header_name("reply-to"), "Reply-to");
        assert_eq!(header_name("élan"), "Élan");
        assert_eq!(header_name("message-id"), "Message-ID");
        assert_eq!(header_name(""), "");
    }

    #[test]
    fn test_build_headers_hides_bcc() {
        let directives = directives(&[
            ("from", "a@x.com"),
            ("bcc", "hidden@x.com"),
            ("subject", "Hi there"),
        ]);
        let headers = String::from_utf8(build_headers(&directives, "B1")).unwrap();
        assert_eq!(
            headers,
            "From: a@x.com\r\nSubject: Hi there\r\n\
             Content-Type: multipart/mixed; boundary=B1\r\nMIME-Version: 1.0\r\n\r\n"
        );
    }

    #[test]
    fn test_multiline_values_stay_on_their_header_line() {
        let directives = directives(&[
            ("from", "a@x.com"),
            ("to", "b@x.com,\n  c@x.com"),
            ("subject", "Hello\nBcc: leak@x.com\r\n  again"),
        ]);
        let message = assemble_message(&directives, "Hi", &[], &[], &RunContext::new()).unwrap();
        let message = String::from_utf8(message).unwrap();

        let (head, _) = message.split_once("\r\n\r\n").unwrap();
        let lines: Vec<&str> = head.split("\r\n").collect();
        assert!(lines.iter().all(|line| !line.contains(['\r', '\n'])));
        assert_eq!(lines[0], "From: a@x.com");
        assert_eq!(lines[1], "To: b@x.com, c@x.com");
        assert_eq!(lines[2], "Subject: Hello Bcc: leak@x.com again");
        assert!(lines.iter().all(|line| !line.starts_with("Bcc")));
    }

    #[test]
    fn test_assemble_message_structure() {
        let context = RunContext::with_token("tok");
        let inline = Attachment::inline(
            &Resource {
                name: "logo.png".into(),
                content: b"\x89PNG\r\n\x1a\n".to_vec(),
            },
            &context,
        );
        let attachment = Attachment::regular(&Resource {
            name: "notes.txt".into(),
            content: b"some notes".to_vec(),
        });
        let id = inline.content_id.clone().unwrap();
        let html = format!("<img src=\"cid:{id}\">Hello");
        let directives = directives(&[("from", "a@x.com"), ("to", "b@x.com")]);

        let message = assemble_message(
            &directives,
            &html,
            std::slice::from_ref(&inline),
            std::slice::from_ref(&attachment),
            &context,
        )
        .unwrap();
        let message = String::from_utf8(message).unwrap();

        let (headers, body) = split_message(&message);
        assert_eq!(headers[0], ("From", "a@x.com"));
        assert_eq!(headers[1], ("To", "b@x.com"));
        assert_eq!(headers[3], ("MIME-Version", "1.0"));
        let mixed = boundary_of(headers[2].1);

        let mixed_parts: Vec<&str> = body
            .strip_prefix(&format!("--{mixed}\r\n"))
            .unwrap()
            .strip_suffix(&format!("\r\n--{mixed}--\r\n"))
            .unwrap()
            .split(&format!("\r\n--{mixed}\r\n"))
            .collect();
        assert_eq!(mixed_parts.len(), 2);

        let (related_headers, related_body) = split_message(mixed_parts[0]);
        assert_eq!(related_headers.len(), 1);
        let related = boundary_of(related_headers[0].1);
        assert_ne!(related, mixed);
        assert!(related_headers[0].1.starts_with("multipart/related; "));

        let related_parts: Vec<&str> = related_body
            .strip_prefix(&format!("--{related}\r\n"))
            .unwrap()
            .strip_suffix(&format!("\r\n--{related}--\r\n"))
            .unwrap()
            .split(&format!("\r\n--{related}\r\n"))
            .collect();
        assert_eq!(related_parts.len(), 2);
        assert_eq!(
            related_parts[0],
            format!("Content-Type: text/html; charset=utf-8\r\n\r\n{html}")
        );
        let (inline_headers, inline_body) = split_message(related_parts[1]);
        assert!(inline_headers.contains(&("Content-ID", format!("<{id}>").as_str())));
        assert_eq!(inline_body, "iVBORw0KGgo=\r\n");

        let (attachment_headers, _) = split_message(mixed_parts[1]);
        assert!(attachment_headers.contains(&(
            "Content-Disposition",
            "attachment; filename=\"notes.txt\"; size=10"
        )));
    }
}
