//! MIME message rendering.
//!
//! Turns an [`EmailMessage`] into an RFC 5322 message string suitable for
//! the SMTP DATA command: text/plain on its own, or multipart/alternative
//! when an HTML body is present.

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::types::*;

/// Render the full message, headers and encoded body, CRLF throughout.
pub fn build_message(msg: &EmailMessage) -> SmtpResult<String> {
    msg.validate()?;

    let mut out = String::with_capacity(msg.text_body.len() + 1024);

    write_header(
        &mut out,
        "Message-ID",
        &format!("<{}@{}>", msg.id, msg.from.domain().unwrap_or("localhost")),
    );
    write_header(
        &mut out,
        "Date",
        &msg.date
            .unwrap_or_else(Utc::now)
            .format("%a, %d %b %Y %H:%M:%S %z")
            .to_string(),
    );
    write_header(&mut out, "From", &format_mailbox(&msg.from));
    write_header(&mut out, "To", &format_mailbox(&msg.to));
    write_header(&mut out, "Subject", &encode_header_value(&msg.subject));
    write_header(&mut out, "MIME-Version", "1.0");

    match &msg.html_body {
        Some(html) => {
            // Text first, HTML second: alternatives are ordered from the
            // plainest to the richest (RFC 2046 §5.1.4).
            let boundary = format!("----=_Alt_{}", uuid::Uuid::new_v4().simple());
            write_header(
                &mut out,
                "Content-Type",
                &format!("multipart/alternative; boundary=\"{}\"", boundary),
            );
            out.push_str("\r\n");
            write_part(
                &mut out,
                &boundary,
                "text/plain",
                &msg.text_body,
                msg.transfer_encoding,
            );
            write_part(&mut out, &boundary, "text/html", html, msg.transfer_encoding);
            out.push_str(&format!("\r\n--{}--\r\n", boundary));
        }
        None => {
            write_header(&mut out, "Content-Type", "text/plain; charset=\"utf-8\"");
            write_header(
                &mut out,
                "Content-Transfer-Encoding",
                &msg.transfer_encoding.to_string(),
            );
            out.push_str("\r\n");
            out.push_str(&encode_body(&msg.text_body, msg.transfer_encoding));
        }
    }

    Ok(out)
}

fn write_part(
    out: &mut String,
    boundary: &str,
    content_type: &str,
    body: &str,
    encoding: TransferEncoding,
) {
    out.push_str(&format!("\r\n--{}\r\n", boundary));
    write_header(
        out,
        "Content-Type",
        &format!("{}; charset=\"utf-8\"", content_type),
    );
    write_header(out, "Content-Transfer-Encoding", &encoding.to_string());
    out.push_str("\r\n");
    out.push_str(&encode_body(body, encoding));
}

fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Render a mailbox for a From/To header, RFC 2047-encoding a non-ASCII
/// display name.
fn format_mailbox(addr: &EmailAddress) -> String {
    match &addr.display_name {
        Some(n) if !n.is_ascii() => format!("{} <{}>", encode_header_value(n), addr.address),
        Some(n) => format!("\"{}\" <{}>", n.replace('"', "\\\""), addr.address),
        None => addr.address.clone(),
    }
}

/// RFC 2047 encode a header value if it contains non-ASCII characters.
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
    format!("=?UTF-8?B?{}?=", encoded)
}

/// Encode body text with the given transfer encoding. Line endings are
/// normalised to CRLF for the 7bit and quoted-printable forms; base64
/// carries the text verbatim.
pub fn encode_body(text: &str, encoding: TransferEncoding) -> String {
    match encoding {
        TransferEncoding::SevenBit => normalise_crlf(text),
        TransferEncoding::QuotedPrintable => {
            quoted_printable::encode_to_str(normalise_crlf(text).as_bytes())
        }
        TransferEncoding::Base64 => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
            b64.as_bytes()
                .chunks(76)
                .map(|c| std::str::from_utf8(c).unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\r\n")
        }
    }
}

/// Convert bare LF line endings to CRLF, leaving existing CRLF untouched.
fn normalise_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut prev_cr = false;
    for ch in text.chars() {
        if ch == '\n' && !prev_cr {
            out.push('\r');
        }
        prev_cr = ch == '\r';
        out.push(ch);
    }
    out
}

// ─── MessageBuilder ─────────────────────────────────────────────────

/// Fluent construction of an [`EmailMessage`].
pub struct MessageBuilder {
    from: Option<EmailAddress>,
    to: Option<EmailAddress>,
    subject: String,
    text: Option<String>,
    html: Option<String>,
    date: Option<DateTime<Utc>>,
    transfer_encoding: TransferEncoding,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            subject: String::new(),
            text: None,
            html: None,
            date: None,
            transfer_encoding: TransferEncoding::default(),
        }
    }

    pub fn from(mut self, addr: EmailAddress) -> Self {
        self.from = Some(addr);
        self
    }

    pub fn to(mut self, addr: EmailAddress) -> Self {
        self.to = Some(addr);
        self
    }

    pub fn subject(mut self, s: impl Into<String>) -> Self {
        self.subject = s.into();
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn transfer_encoding(mut self, enc: TransferEncoding) -> Self {
        self.transfer_encoding = enc;
        self
    }

    pub fn build(self) -> SmtpResult<EmailMessage> {
        let from = self
            .from
            .ok_or_else(|| SmtpError::message("From address is required"))?;
        let to = self
            .to
            .ok_or_else(|| SmtpError::message("a recipient is required"))?;
        let text = self
            .text
            .ok_or_else(|| SmtpError::message("a text body is required"))?;

        let mut msg = EmailMessage::new(from, to, self.subject, text);
        msg.html_body = self.html;
        msg.date = self.date;
        msg.transfer_encoding = self.transfer_encoding;
        msg.validate()?;
        Ok(msg)
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
