// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! MIME helpers shared by the S/MIME verifier, the origin check and token
//! extraction.
//!
//! Header parsing and transfer decoding go through `mailparse`. Splitting a
//! `multipart/signed` body is done here on raw bytes, because the signature
//! covers the first part exactly as transmitted.

use mailparse::{MailHeaderMap, ParsedContentType, ParsedMail};
use tracing::debug;

/// Parse the top-level header block of `raw`.
pub fn parse_head(raw: &[u8]) -> Option<(Vec<mailparse::MailHeader<'_>>, usize)> {
    match mailparse::parse_headers(raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(error = %e, "Unparseable message headers");
            None
        }
    }
}

/// Every value of header `name`, in message order.
pub fn header_values(raw: &[u8], name: &str) -> Vec<String> {
    parse_head(raw)
        .map(|(headers, _)| headers.get_all_values(name))
        .unwrap_or_default()
}

/// The top-level content type and the raw body it describes.
pub fn content_type_and_body(raw: &[u8]) -> Option<(ParsedContentType, &[u8])> {
    let (headers, offset) = parse_head(raw)?;
    let ctype = headers
        .get_first_value("Content-Type")
        .map(|value| mailparse::parse_content_type(&value))
        .unwrap_or_default();
    Some((ctype, raw.get(offset..)?))
}

/// Split a multipart body on `--boundary` lines.
///
/// Each part runs from the line after one delimiter to the line break that
/// precedes the next; that line break belongs to the delimiter. Preamble and
/// epilogue are dropped.
pub fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = body[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| line_start + i + 1)
            .unwrap_or(body.len());
        let line = &body[line_start..line_end];

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let rest = rest.trim_ascii();
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = part_start {
                    parts.push(&body[start..strip_line_break(body, start, line_start)]);
                }
                if closing {
                    return parts;
                }
                part_start = Some(line_end);
            }
        }
        line_start = line_end;
    }

    parts
}

fn strip_line_break(body: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

/// Rewrite bare LF line endings as CRLF.
pub fn canonicalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 32);
    let mut previous = 0u8;
    for &b in bytes {
        if b == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        previous = b;
    }
    out
}

/// Decoded bodies of every `text/*` leaf part, in message order.
pub fn text_bodies(raw: &[u8]) -> Vec<String> {
    match mailparse::parse_mail(raw) {
        Ok(mail) => {
            let mut out = Vec::new();
            collect_text(&mail, &mut out);
            out
        }
        Err(e) => {
            debug!(error = %e, "Message is not parseable MIME, using raw text");
            vec![String::from_utf8_lossy(raw).into_owned()]
        }
    }
}

fn collect_text(part: &ParsedMail<'_>, out: &mut Vec<String>) {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.starts_with("text/") {
            match part.get_body() {
                Ok(body) => out.push(body),
                Err(e) => debug!(error = %e, mimetype = %part.ctype.mimetype, "Undecodable text part"),
            }
        }
        return;
    }
    for sub in &part.subparts {
        collect_text(sub, out);
    }
}

/// Decoded body of a single MIME entity (headers included in `entity`).
pub fn decoded_body(entity: &[u8]) -> Option<Vec<u8>> {
    mailparse::parse_mail(entity).ok()?.get_body_raw().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &[u8] = b"Content-Type: multipart/signed; protocol=\"application/x-pkcs7-signature\"; micalg=\"sha-256\"; boundary=\"XYZ\"\n\
\n\
This is an S/MIME signed message\n\
\n\
--XYZ\n\
Content-Type: text/plain\n\
\n\
hello\n\
\n\
--XYZ\n\
Content-Type: application/x-pkcs7-signature\n\
\n\
AAAA\n\
\n\
--XYZ--\n\
\n";

    #[test]
    fn test_split_multipart_excludes_delimiter_line_break() {
        let (ctype, body) = content_type_and_body(SIGNED).unwrap();
        assert_eq!(ctype.mimetype, "multipart/signed");
        let parts = split_multipart(body, &ctype.params["boundary"]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], b"Content-Type: text/plain\n\nhello\n".as_slice());
        assert_eq!(parts[1], b"Content-Type: application/x-pkcs7-signature\n\nAAAA\n".as_slice());
    }

    #[test]
    fn test_split_multipart_without_closing_delimiter() {
        let parts = split_multipart(b"--b\r\none\r\n--b\r\ntwo", "b");
        assert_eq!(parts, vec![b"one".as_slice()]);
    }

    #[test]
    fn test_canonicalize_line_endings() {
        assert_eq!(canonicalize_line_endings(b"a\nb\r\nc\n"), b"a\r\nb\r\nc\r\n".to_vec());
    }

    #[test]
    fn test_header_values_returns_every_occurrence() {
        let raw = b"X-Originating-IP: [10.0.0.1]\nX-Originating-IP: 10.0.0.2\nSubject: hi\n\nbody";
        assert_eq!(header_values(raw, "x-originating-ip"), vec!["[10.0.0.1]", "10.0.0.2"]);
    }

    #[test]
    fn test_text_bodies_decodes_quoted_printable() {
        let raw = b"Content-Type: multipart/alternative; boundary=\"b\"\n\n--b\nContent-Type: text/plain\nContent-Transfer-Encoding: quoted-printable\n\n=3D=3D token\n--b\nContent-Type: text/html\n\n<p>html</p>\n--b--\n";
        let bodies = text_bodies(raw);
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].starts_with("== token"));
        assert!(bodies[1].contains("<p>html</p>"));
    }
}
