//! Low-level SMTP protocol engine.
//!
//! Handles the TCP connection, STARTTLS upgrade, EHLO/HELO negotiation,
//! command/reply exchange and the DATA transfer. [`send_message`] wraps
//! the whole session for one-shot delivery.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::types::*;

// ─── Stream Abstraction ─────────────────────────────────────────────

/// Wrapper over the plain-text or TLS socket so the engine stays generic.
enum SmtpStream {
    Plain(BufReader<TcpStream>),
    Tls(BufReader<TlsStream<TcpStream>>),
}

impl SmtpStream {
    async fn read_line(&mut self, buf: &mut String) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => r.read_line(buf).await,
            Self::Tls(r) => r.read_line(buf).await,
        }
    }

    /// Write and flush in one go; SMTP is strictly request/reply so there
    /// is nothing to gain from batching.
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(r) => {
                let s = r.get_mut();
                s.write_all(data).await?;
                s.flush().await
            }
            Self::Tls(r) => {
                let s = r.get_mut();
                s.write_all(data).await?;
                s.flush().await
            }
        }
    }
}

// ─── SmtpClient ─────────────────────────────────────────────────────

/// The low-level SMTP client.
pub struct SmtpClient {
    stream: Option<SmtpStream>,
    config: SmtpConfig,
    capabilities: Option<EhloCapabilities>,
    tls_active: bool,
    authenticated: bool,
}

impl SmtpClient {
    /// Create a new SMTP client with the given configuration.
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            stream: None,
            config,
            capabilities: None,
            tls_active: false,
            authenticated: false,
        }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Option<&EhloCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls_active
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Mark as authenticated (called by the auth module on success).
    pub fn set_authenticated(&mut self, auth: bool) {
        self.authenticated = auth;
    }

    // ── Connection ──────────────────────────────────────────────

    /// Connect to the server and read the 220 greeting.
    pub async fn connect(&mut self) -> SmtpResult<SmtpReply> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("Connecting to SMTP server {}", addr);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SmtpError::timeout(format!("connect to {} timed out", addr)))?
            .map_err(|e| SmtpError::connection(format!("connect to {} failed: {}", addr, e)))?;

        match self.config.security {
            SmtpSecurity::ImplicitTls => {
                let tls = self.tls_handshake(tcp).await?;
                self.stream = Some(SmtpStream::Tls(BufReader::new(tls)));
                self.tls_active = true;
            }
            _ => {
                self.stream = Some(SmtpStream::Plain(BufReader::new(tcp)));
            }
        }

        let greeting = self.read_reply().await?;
        if greeting.code != 220 {
            return Err(SmtpError::server(
                greeting.code,
                format!("server rejected connection: {}", greeting.text()),
            ));
        }
        info!("SMTP connected to {}: {}", addr, greeting.text());
        Ok(greeting)
    }

    /// Perform EHLO (falling back to HELO) and record capabilities.
    pub async fn ehlo(&mut self) -> SmtpResult<EhloCapabilities> {
        let domain = self.config.ehlo_domain.clone();
        let reply = self.command(&format!("EHLO {}", domain)).await?;
        if reply.is_positive() {
            let caps = EhloCapabilities::parse(&reply);
            self.capabilities = Some(caps.clone());
            return Ok(caps);
        }

        debug!("EHLO rejected ({}), trying HELO", reply.code);
        let reply = self.command(&format!("HELO {}", domain)).await?;
        if reply.is_positive() {
            let caps = EhloCapabilities {
                server_name: reply.lines.first().cloned().unwrap_or_default(),
                ..Default::default()
            };
            self.capabilities = Some(caps.clone());
            Ok(caps)
        } else {
            Err(SmtpError::server(
                reply.code,
                format!("HELO rejected: {}", reply.text()),
            ))
        }
    }

    /// Upgrade the plain-text connection to TLS via STARTTLS, then
    /// re-issue EHLO since the capability set may change (RFC 3207).
    pub async fn starttls(&mut self) -> SmtpResult<()> {
        if self.tls_active {
            return Ok(());
        }
        if let Some(caps) = &self.capabilities {
            if !caps.starttls {
                return Err(SmtpError::tls("server does not advertise STARTTLS"));
            }
        }

        let reply = self.command("STARTTLS").await?;
        if reply.code != 220 {
            return Err(SmtpError::tls(format!(
                "STARTTLS rejected: {} {}",
                reply.code,
                reply.text()
            )));
        }

        let stream = self
            .stream
            .take()
            .ok_or_else(|| SmtpError::io("not connected"))?;
        let tcp = match stream {
            SmtpStream::Plain(r) => r.into_inner(),
            SmtpStream::Tls(_) => return Err(SmtpError::tls("connection is already TLS")),
        };

        let tls = self.tls_handshake(tcp).await?;
        self.stream = Some(SmtpStream::Tls(BufReader::new(tls)));
        self.tls_active = true;
        info!("STARTTLS upgrade successful");

        self.ehlo().await?;
        Ok(())
    }

    /// Close the connection gracefully via QUIT.
    pub async fn quit(&mut self) -> SmtpResult<()> {
        if self.stream.is_some() {
            let _ = self.command("QUIT").await;
            self.stream = None;
            debug!("SMTP connection closed");
        }
        self.tls_active = false;
        self.authenticated = false;
        self.capabilities = None;
        Ok(())
    }

    // ── Mail Transaction ────────────────────────────────────────

    /// Issue MAIL FROM.
    pub async fn mail_from(&mut self, sender: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command(&format!("MAIL FROM:<{}>", sender)).await?;
        if reply.is_error() {
            return Err(SmtpError::server(
                reply.code,
                format!("MAIL FROM rejected: {}", reply.text()),
            ));
        }
        Ok(reply)
    }

    /// Issue RCPT TO.
    pub async fn rcpt_to(&mut self, recipient: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command(&format!("RCPT TO:<{}>", recipient)).await?;
        if reply.is_error() {
            return Err(SmtpError::server(
                reply.code,
                format!("RCPT TO rejected for {}: {}", recipient, reply.text()),
            ));
        }
        Ok(reply)
    }

    /// Issue DATA, transmit the dot-stuffed body and the terminating dot.
    pub async fn data(&mut self, body: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command("DATA").await?;
        if !reply.is_intermediate() {
            return Err(SmtpError::server(
                reply.code,
                format!("DATA rejected: {}", reply.text()),
            ));
        }

        let stuffed = Self::dot_stuff(body);
        self.write_timed(stuffed.as_bytes()).await?;
        self.write_timed(b".\r\n").await?;

        let reply = self.read_reply().await?;
        if reply.is_error() {
            return Err(SmtpError::server(
                reply.code,
                format!("message rejected: {}", reply.text()),
            ));
        }
        Ok(reply)
    }

    /// Run the envelope for a single recipient: MAIL FROM, RCPT TO, DATA.
    pub async fn send_envelope(
        &mut self,
        from: &str,
        recipient: &str,
        body: &str,
    ) -> SmtpResult<SmtpReply> {
        self.mail_from(from).await?;
        self.rcpt_to(recipient).await?;
        self.data(body).await
    }

    // ── Low-level I/O ───────────────────────────────────────────

    /// Send a command line and read the reply.
    pub async fn command(&mut self, cmd: &str) -> SmtpResult<SmtpReply> {
        debug!("C: {}", cmd);
        self.send_line(cmd).await
    }

    /// Like [`command`](Self::command) but keeps the payload out of the
    /// logs. Used for AUTH exchanges.
    pub async fn command_redacted(&mut self, cmd: &str) -> SmtpResult<SmtpReply> {
        debug!("C: [credentials redacted]");
        self.send_line(cmd).await
    }

    async fn send_line(&mut self, cmd: &str) -> SmtpResult<SmtpReply> {
        self.write_timed(format!("{}\r\n", cmd).as_bytes()).await?;
        self.read_reply().await
    }

    /// Read a complete, possibly multi-line SMTP reply.
    pub async fn read_reply(&mut self) -> SmtpResult<SmtpReply> {
        let timeout = Duration::from_secs(self.config.io_timeout_secs);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SmtpError::io("not connected"))?;

        let mut raw = String::new();
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(timeout, stream.read_line(&mut line))
                .await
                .map_err(|_| SmtpError::timeout("read timed out"))?
                .map_err(|e| SmtpError::io(format!("read failed: {}", e)))?;

            if n == 0 {
                return Err(SmtpError::io("connection closed by server"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            debug!("S: {}", line);
            raw.push_str(line);
            raw.push('\n');

            // Continuation lines have a dash after the code; the final
            // line has a space (or nothing at all after the code).
            if line.len() < 4 || line.as_bytes()[3] == b' ' {
                break;
            }
        }

        SmtpReply::parse(&raw)
    }

    async fn write_timed(&mut self, data: &[u8]) -> SmtpResult<()> {
        let timeout = Duration::from_secs(self.config.io_timeout_secs);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SmtpError::io("not connected"))?;
        tokio::time::timeout(timeout, stream.write_all(data))
            .await
            .map_err(|_| SmtpError::timeout("write timed out"))?
            .map_err(|e| SmtpError::io(format!("write failed: {}", e)))
    }

    // ── TLS helper ──────────────────────────────────────────────

    async fn tls_handshake(&self, tcp: TcpStream) -> SmtpResult<TlsStream<TcpStream>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = rustls::pki_types::ServerName::try_from(self.config.host.clone())
            .map_err(|e| SmtpError::tls(format!("invalid server name: {}", e)))?;

        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| SmtpError::tls(format!("TLS handshake failed: {}", e)))
    }

    // ── Dot-stuffing ────────────────────────────────────────────

    /// Normalise line endings to CRLF and escape lines starting with `.`
    /// (RFC 5321 §4.5.2). The result always ends with CRLF so the caller
    /// can append the bare terminating dot.
    fn dot_stuff(body: &str) -> String {
        let mut segments: Vec<&str> = body.split('\n').collect();
        if segments.last() == Some(&"") {
            segments.pop();
        }

        let mut out = String::with_capacity(body.len() + 64);
        for line in segments {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }
}

// ─── One-shot send ──────────────────────────────────────────────────

/// Deliver one message over a fresh connection: connect, EHLO, STARTTLS
/// when configured, AUTH when credentials are present, envelope, QUIT.
///
/// The connection is always closed before returning, success or not.
pub async fn send_message(config: SmtpConfig, msg: &EmailMessage) -> SmtpResult<SmtpReply> {
    let raw = crate::message::build_message(msg)?;

    let mut client = SmtpClient::new(config);
    let result = submit(&mut client, msg, &raw).await;
    let _ = client.quit().await;
    result
}

async fn submit(client: &mut SmtpClient, msg: &EmailMessage, raw: &str) -> SmtpResult<SmtpReply> {
    client.connect().await?;
    client.ehlo().await?;

    match client.config().security {
        SmtpSecurity::StartTls => client.starttls().await?,
        SmtpSecurity::None => warn!("SMTP session is not encrypted"),
        SmtpSecurity::ImplicitTls => {}
    }

    if let Some(creds) = client.config().credentials.clone() {
        crate::auth::authenticate(client, &creds).await?;
    }

    client
        .send_envelope(&msg.from.address, &msg.to.address, raw)
        .await
}

// ─── Tests ──────────────────────────────────────────────────────────
