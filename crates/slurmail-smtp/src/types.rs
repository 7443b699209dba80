//! Data types, error handling and configuration for the SMTP crate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Error ──────────────────────────────────────────────────────────

/// Kinds of SMTP errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpErrorKind {
    /// Server returned an error reply (4xx / 5xx).
    ServerReply,
    /// Authentication failed or could not be negotiated.
    AuthFailure,
    /// TLS negotiation failed.
    TlsError,
    /// Connection refused or could not be established.
    ConnectionError,
    /// Read or write exceeded the configured timeout.
    TimeoutError,
    /// I/O error during socket read/write.
    IoError,
    /// The message itself is malformed.
    MessageError,
    /// Configuration / credential error.
    ConfigError,
}

impl fmt::Display for SmtpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Top-level error type for the SMTP crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpError {
    pub kind: SmtpErrorKind,
    pub message: String,
    /// The SMTP reply code (e.g. 550) if available.
    pub code: Option<u16>,
}

impl SmtpError {
    pub fn new(kind: SmtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConnectionError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::TimeoutError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::AuthFailure, msg)
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::TlsError, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::IoError, msg)
    }

    pub fn server(code: u16, msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ServerReply, msg).with_code(code)
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::MessageError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConfigError, msg)
    }
}

impl fmt::Display for SmtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[SMTP {}] {}: {}", code, self.kind, self.message)
        } else {
            write!(f, "[SMTP] {}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for SmtpError {}

pub type SmtpResult<T> = Result<T, SmtpError>;

// ─── Enums ──────────────────────────────────────────────────────────

/// SMTP channel security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtpSecurity {
    /// Unencrypted (port 25, or 587 without upgrade).
    None,
    /// STARTTLS upgrade on port 587.
    StartTls,
    /// Implicit TLS (SMTPS) on port 465.
    ImplicitTls,
}

impl Default for SmtpSecurity {
    fn default() -> Self {
        Self::StartTls
    }
}

/// Supported authentication mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    Plain,
    Login,
    CramMd5,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "PLAIN"),
            Self::Login => write!(f, "LOGIN"),
            Self::CramMd5 => write!(f, "CRAM-MD5"),
        }
    }
}

/// Content-Transfer-Encoding for text parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEncoding {
    SevenBit,
    QuotedPrintable,
    Base64,
}

impl Default for TransferEncoding {
    fn default() -> Self {
        Self::QuotedPrintable
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

// ─── Configuration ──────────────────────────────────────────────────

/// Credentials for SMTP authentication.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Force a specific mechanism instead of negotiating one.
    pub method: Option<AuthMethod>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            method: None,
        }
    }
}

/// SMTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Hostname or IP of the SMTP server.
    pub host: String,
    /// Port (25 / 465 / 587).
    pub port: u16,
    /// Channel security mode.
    pub security: SmtpSecurity,
    /// Domain to present in the EHLO/HELO command.
    pub ehlo_domain: String,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read/write timeout in seconds.
    pub io_timeout_secs: u64,
    /// Credentials, if the server requires authentication.
    pub credentials: Option<Credentials>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            security: SmtpSecurity::StartTls,
            ehlo_domain: "localhost".into(),
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
            credentials: None,
        }
    }
}

// ─── Email Address ──────────────────────────────────────────────────

/// An email address with an optional display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Display name (e.g. "Cluster Ops").
    pub display_name: Option<String>,
    /// The address itself (e.g. "ops@example.com").
    pub address: String,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            display_name: None,
            address: address.into(),
        }
    }

    pub fn with_display_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Format as an RFC 5322 mailbox (e.g. `"Cluster Ops" <ops@example.com>`).
    pub fn to_mailbox(&self) -> String {
        match &self.display_name {
            Some(n) => format!("\"{}\" <{}>", n.replace('"', "\\\""), self.address),
            None => self.address.clone(),
        }
    }

    /// Parse a mailbox string like `"Name" <addr>` or a bare `addr`.
    pub fn parse(input: &str) -> SmtpResult<Self> {
        let input = input.trim();
        if let Some(lt) = input.find('<') {
            // Only a '>' after the '<' closes the mailbox.
            if let Some(gt) = input[lt + 1..].find('>').map(|i| lt + 1 + i) {
                let addr = input[lt + 1..gt].trim().to_string();
                let name_part = input[..lt].trim();
                let display_name = if name_part.is_empty() {
                    None
                } else {
                    let n = name_part.trim_matches('"').trim().to_string();
                    if n.is_empty() {
                        None
                    } else {
                        Some(n)
                    }
                };
                if addr.contains('@') {
                    return Ok(Self {
                        display_name,
                        address: addr,
                    });
                }
            }
        }
        if input.contains('@') && !input.contains(' ') {
            return Ok(Self {
                display_name: None,
                address: input.to_string(),
            });
        }
        Err(SmtpError::message(format!("invalid email address: {}", input)))
    }

    /// Basic structural check: non-empty local part and dotted domain.
    pub fn is_valid(&self) -> bool {
        let a = &self.address;
        if let Some(at) = a.find('@') {
            let local = &a[..at];
            let domain = &a[at + 1..];
            !local.is_empty() && !domain.is_empty() && domain.contains('.')
        } else {
            false
        }
    }

    /// The domain part, if present.
    pub fn domain(&self) -> Option<&str> {
        self.address.find('@').map(|at| &self.address[at + 1..])
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_mailbox())
    }
}

// ─── Email Message ──────────────────────────────────────────────────

/// A single-recipient email ready to be rendered and sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Unique message identifier (uuid, used in the Message-ID header).
    pub id: String,
    /// Sender.
    pub from: EmailAddress,
    /// The one recipient.
    pub to: EmailAddress,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text_body: String,
    /// Optional HTML alternative.
    pub html_body: Option<String>,
    /// Date header override (defaults to send time).
    pub date: Option<DateTime<Utc>>,
    /// Transfer encoding for text parts.
    pub transfer_encoding: TransferEncoding,
}

impl EmailMessage {
    pub fn new(
        from: EmailAddress,
        to: EmailAddress,
        subject: impl Into<String>,
        text_body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            date: None,
            transfer_encoding: TransferEncoding::default(),
        }
    }

    /// Validate the addresses before rendering or sending.
    pub fn validate(&self) -> SmtpResult<()> {
        if !self.from.is_valid() {
            return Err(SmtpError::message(format!(
                "invalid From address: {}",
                self.from.address
            )));
        }
        if !self.to.is_valid() {
            return Err(SmtpError::message(format!(
                "invalid recipient address: {}",
                self.to.address
            )));
        }
        Ok(())
    }
}

// ─── SMTP Reply ─────────────────────────────────────────────────────

/// A parsed (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpReply {
    /// The 3-digit reply code.
    pub code: u16,
    /// Reply text lines, code stripped.
    pub lines: Vec<String>,
}

impl SmtpReply {
    /// Positive completion (2xx).
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Positive intermediate (3xx), e.g. 354 after DATA.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Transient or permanent failure (4xx / 5xx).
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    /// The full reply text, lines joined.
    pub fn text(&self) -> String {
        self.lines.join(" / ")
    }

    /// Parse raw reply lines as read off the wire.
    ///
    /// The code is taken from the first line; continuation lines repeat it
    /// with a `-` separator and the final line uses a space.
    pub fn parse(raw: &str) -> SmtpResult<Self> {
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();

        for line in raw.lines() {
            if line.len() < 3 {
                continue;
            }
            // Sliced with get(): a broken server can put a multibyte
            // character where the digits or the separator belong.
            let c: u16 = line
                .get(..3)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| SmtpError::io(format!("malformed reply line: {}", line)))?;
            if code.is_none() {
                code = Some(c);
            }
            let text = line.get(4..).unwrap_or("");
            lines.push(text.to_string());
        }

        match code {
            Some(c) => Ok(SmtpReply { code: c, lines }),
            None => Err(SmtpError::io("empty SMTP reply")),
        }
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

// ─── EHLO Capabilities ──────────────────────────────────────────────

/// Parsed EHLO capability set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EhloCapabilities {
    /// The server greeting name from the first EHLO line.
    pub server_name: String,
    /// Maximum message size (SIZE extension).
    pub max_size: Option<u64>,
    /// Advertised AUTH mechanisms, uppercased.
    pub auth_mechanisms: Vec<String>,
    /// STARTTLS supported.
    pub starttls: bool,
    /// 8BITMIME supported.
    pub eight_bit_mime: bool,
    /// PIPELINING supported.
    pub pipelining: bool,
}

impl EhloCapabilities {
    /// Parse EHLO response lines into capabilities.
    pub fn parse(reply: &SmtpReply) -> Self {
        let mut caps = Self::default();
        for (i, line) in reply.lines.iter().enumerate() {
            if i == 0 {
                caps.server_name = line.clone();
                continue;
            }
            let upper = line.to_uppercase();
            let mut parts = upper.splitn(2, ' ');
            let keyword = parts.next().unwrap_or("");
            let param = parts.next().unwrap_or("");

            match keyword {
                "SIZE" => caps.max_size = param.parse().ok(),
                "AUTH" => {
                    caps.auth_mechanisms =
                        param.split_whitespace().map(|s| s.to_string()).collect();
                }
                "STARTTLS" => caps.starttls = true,
                "8BITMIME" => caps.eight_bit_mime = true,
                "PIPELINING" => caps.pipelining = true,
                _ => {}
            }
        }
        caps
    }

    /// Whether a given AUTH mechanism is advertised.
    pub fn supports_auth(&self, method: &str) -> bool {
        let upper = method.to_uppercase();
        self.auth_mechanisms.iter().any(|m| m == &upper)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
