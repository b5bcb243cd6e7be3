//! MIME helpers: content type sniffing and wrapped base64 bodies.

use base64::{engine::general_purpose, Engine as _};

/// Maximum length of a base64 body line, as mandated by RFC 2045.
pub const BASE64_LINE_LENGTH: usize = 76;

/// Line terminator used across the whole message.
pub const CRLF: &[u8] = b"\r\n";

/// Number of leading bytes inspected when sniffing content.
const SNIFF_LENGTH: usize = 512;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Signatures matched verbatim at the start of the content.
const PREFIX_SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN_UTF8),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x00\x01\x00\x00", "font/ttf"),
    (b"OTTO", "font/otf"),
    (b"ttcf", "font/collection"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Container formats identified by a four byte tag at offset 8.
const TAGGED_SIGNATURES: &[(&[u8], &[u8], &str)] = &[
    (b"RIFF", b"WEBP", "image/webp"),
    (b"RIFF", b"WAVE", "audio/wave"),
    (b"RIFF", b"AVI ", "video/avi"),
    (b"FORM", b"AIFF", "audio/aiff"),
];

/// Tags that mark a document as HTML when followed by a space or `>`.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Determines the content type of `content` from its leading bytes.
///
/// Always returns a valid MIME type, falling back to
/// `application/octet-stream` for binary data and to
/// `text/plain; charset=utf-8` for anything that looks like text.
///
/// # Examples
///
/// ```rust
/// assert_eq!(mailform_utils::sniff_content_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
/// assert_eq!(mailform_utils::sniff_content_type(b"  <html><body>"), "text/html; charset=utf-8");
/// assert_eq!(mailform_utils::sniff_content_type(b"plain words"), "text/plain; charset=utf-8");
/// ```
pub fn sniff_content_type(content: &[u8]) -> &'static str {
    let data = &content[..content.len().min(SNIFF_LENGTH)];

    let trimmed = {
        let start = data
            .iter()
            .position(|byte| !matches!(*byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
            .unwrap_or(data.len());
        &data[start..]
    };
    if HTML_TAGS.iter().any(|tag| matches_html_tag(trimmed, tag)) {
        return TEXT_HTML_UTF8;
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if let Some((_, content_type)) = PREFIX_SIGNATURES
        .iter()
        .find(|(signature, _)| data.starts_with(signature))
    {
        return *content_type;
    }
    if let Some((_, _, content_type)) = TAGGED_SIGNATURES
        .iter()
        .find(|(head, tag, _)| data.starts_with(head) && data.get(8..12) == Some(*tag))
    {
        return *content_type;
    }
    if is_mp4(data) {
        return "video/mp4";
    }

    if data.iter().any(|byte| is_binary_byte(*byte)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN_UTF8
    }
}

/// Sniffs the content type and, when sniffing only finds generic text or
/// binary data, refines it with the type registered for the file
/// extension of `name`.
pub fn detect_content_type(content: &[u8], name: &str) -> String {
    let sniffed = sniff_content_type(content);
    if sniffed != TEXT_PLAIN_UTF8 && sniffed != OCTET_STREAM {
        return sniffed.to_string();
    }
    match mime_guess::from_path(name).first() {
        Some(guess) if guess.type_() == mime_guess::mime::TEXT && sniffed == TEXT_PLAIN_UTF8 => {
            format!("{}; charset=utf-8", guess.essence_str())
        }
        Some(guess) if sniffed == OCTET_STREAM && guess.type_() != mime_guess::mime::TEXT => {
            guess.essence_str().to_string()
        }
        _ => sniffed.to_string(),
    }
}

fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size % 4 != 0 || data.len() < box_size || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|offset| *offset != 12)
        .any(|offset| data.get(offset..offset + 3) == Some(&b"mp4"[..]))
}

fn is_binary_byte(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Encodes `content` as base64 hard-wrapped at [`BASE64_LINE_LENGTH`]
/// characters, every line (the last, shorter, one included) terminated
/// by CRLF.
///
/// # Examples
///
/// ```rust
/// assert_eq!(mailform_utils::encode_base64_wrapped(b"hello"), b"aGVsbG8=\r\n");
/// assert!(mailform_utils::encode_base64_wrapped(b"").is_empty());
/// ```
pub fn encode_base64_wrapped(content: &[u8]) -> Vec<u8> {
    let encoded = general_purpose::STANDARD.encode(content);
    let lines = encoded.len().div_ceil(BASE64_LINE_LENGTH);
    let mut body = Vec::with_capacity(encoded.len() + lines * CRLF.len());
    for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        body.extend_from_slice(line);
        body.extend_from_slice(CRLF);
    }
    body
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Splits a raw message into its header fields and the content after
    /// the first blank line, one field per `Name: value` line.
    pub(crate) fn split_message(raw: &str) -> (Vec<(&str, &str)>, &str) {
        let (head, content) = match raw.find("\r\n\r\n") {
            Some(index) => (&raw[..index], &raw[index + 4..]),
            None => (raw, ""),
        };
        let headers = head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
            .collect();
        (headers, content)
    }

    #[test]
    fn test_sniff_images() {
        assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(sniff_content_type(b"\xFF\xD8\xFF\xE0JFIF"), "image/jpeg");
        assert_eq!(sniff_content_type(b"GIF89a\x01\x00"), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"RIFF\x24\x00\x00\x00WAVEfmt "), "audio/wave");
    }

    #[test]
    fn test_sniff_documents() {
        assert_eq!(sniff_content_type(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff_content_type(b"PK\x03\x04\x14\x00"), "application/zip");
        assert_eq!(sniff_content_type(b"<?xml version=\"1.0\"?>"), "text/xml; charset=utf-8");
        assert_eq!(sniff_content_type(b"\n\t<!DOCTYPE html>"), TEXT_HTML_UTF8);
        assert_eq!(sniff_content_type(b"<p>para</p>"), TEXT_HTML_UTF8);
        assert_eq!(sniff_content_type(b"<pre>"), TEXT_PLAIN_UTF8);
    }

    #[test]
    fn test_sniff_mp4() {
        let mut data = vec![0x00, 0x00, 0x00, 0x18];
        data.extend_from_slice(b"ftypmp42");
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(b"mp41isom");
        assert_eq!(sniff_content_type(&data), "video/mp4");
    }

    #[test]
    fn test_sniff_fallbacks() {
        assert_eq!(sniff_content_type(b"body { color: red; }"), TEXT_PLAIN_UTF8);
        assert_eq!(sniff_content_type(b"\x01\x02\x03binary"), OCTET_STREAM);
        assert_eq!(sniff_content_type(b""), TEXT_PLAIN_UTF8);
    }

    #[test]
    fn test_detect_content_type_refines_generic_types() {
        assert_eq!(
            detect_content_type(b"body { color: red; }", "style.css"),
            "text/css; charset=utf-8"
        );
        assert_eq!(
            detect_content_type(b"\x00\x61\x73\x6d\x01", "module.wasm"),
            "application/wasm"
        );
        assert_eq!(
            detect_content_type(b"\x01\x02\x03", "blob.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(detect_content_type(b"\x89PNG\r\n\x1a\n", "logo.txt"), "image/png");
        assert_eq!(detect_content_type(b"notes", "notes"), TEXT_PLAIN_UTF8);
        assert_eq!(detect_content_type(b"\x01\x02", "notes.txt"), OCTET_STREAM);
    }

    #[test]
    fn test_base64_exact_multiple() {
        // 114 input bytes encode to exactly 152 characters, two full lines
        let body = encode_base64_wrapped(&[b'a'; 114]);
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.len() == BASE64_LINE_LENGTH));
        assert!(text.ends_with("\r\n"));
        assert!(!text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_base64_partial_last_line() {
        let body = encode_base64_wrapped(&[0xAB; 100]);
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), BASE64_LINE_LENGTH);
        assert_eq!(lines[1].len(), 136 - BASE64_LINE_LENGTH);
        assert!(text.ends_with("\r\n"));
        let joined: String = lines.concat();
        assert_eq!(
            general_purpose::STANDARD.decode(joined).unwrap(),
            vec![0xAB; 100]
        );
    }

    #[test]
    fn test_split_message() {
        let (headers, content) =
            split_message("To: b@x.com\r\nContent-Type: multipart/mixed; boundary=ab\r\n\r\n--ab\r\n");
        assert_eq!(
            headers,
            [("To", "b@x.com"), ("Content-Type", "multipart/mixed; boundary=ab")]
        );
        assert_eq!(content, "--ab\r\n");

        let (headers, content) = split_message("Subject: only");
        assert_eq!(headers, [("Subject", "only")]);
        assert_eq!(content, "");
    }
}
