//! SMTP authentication mechanisms: PLAIN, LOGIN and CRAM-MD5.

use base64::Engine;
use log::debug;

use crate::client::SmtpClient;
use crate::types::*;

/// Authenticate with the server using the given credentials.
///
/// The mechanism comes from `creds.method` when set; otherwise the best
/// advertised mechanism is picked in the order CRAM-MD5, PLAIN, LOGIN.
/// Either way the server must advertise the mechanism in its EHLO reply.
pub async fn authenticate(client: &mut SmtpClient, creds: &Credentials) -> SmtpResult<()> {
    let method = select_auth_method(client.capabilities(), creds)?;
    debug!("Authenticating with {}", method);

    match method {
        AuthMethod::Plain => auth_plain(client, creds).await,
        AuthMethod::Login => auth_login(client, creds).await,
        AuthMethod::CramMd5 => auth_cram_md5(client, creds).await,
    }
}

fn select_auth_method(
    caps: Option<&EhloCapabilities>,
    creds: &Credentials,
) -> SmtpResult<AuthMethod> {
    let caps = caps.ok_or_else(|| {
        SmtpError::auth("server capabilities unknown, cannot negotiate AUTH")
    })?;

    if let Some(m) = creds.method {
        if caps.supports_auth(&m.to_string()) {
            return Ok(m);
        }
        return Err(SmtpError::auth(format!(
            "server does not advertise AUTH {}",
            m
        )));
    }

    for m in [AuthMethod::CramMd5, AuthMethod::Plain, AuthMethod::Login] {
        if caps.supports_auth(&m.to_string()) {
            return Ok(m);
        }
    }
    Err(SmtpError::auth(
        "server advertises no supported AUTH mechanism",
    ))
}

// ── AUTH PLAIN ──────────────────────────────────────────────────────

/// AUTH PLAIN: `\0username\0password`, base64-encoded, in one command.
async fn auth_plain(client: &mut SmtpClient, creds: &Credentials) -> SmtpResult<()> {
    let payload = build_plain_payload(&creds.username, &creds.password);
    let reply = client
        .command_redacted(&format!("AUTH PLAIN {}", payload))
        .await?;

    if reply.is_positive() {
        client.set_authenticated(true);
        Ok(())
    } else {
        Err(SmtpError::auth(format!(
            "AUTH PLAIN failed: {} {}",
            reply.code,
            reply.text()
        )))
    }
}

// ── AUTH LOGIN ──────────────────────────────────────────────────────

/// AUTH LOGIN: 334 challenges answered with base64 username, then password.
async fn auth_login(client: &mut SmtpClient, creds: &Credentials) -> SmtpResult<()> {
    let reply = client.command("AUTH LOGIN").await?;
    if !reply.is_intermediate() {
        return Err(SmtpError::auth(format!(
            "AUTH LOGIN rejected: {} {}",
            reply.code,
            reply.text()
        )));
    }

    let user_b64 = base64::engine::general_purpose::STANDARD.encode(creds.username.as_bytes());
    let reply = client.command_redacted(&user_b64).await?;
    if !reply.is_intermediate() {
        return Err(SmtpError::auth(format!(
            "AUTH LOGIN username rejected: {} {}",
            reply.code,
            reply.text()
        )));
    }

    let pass_b64 = base64::engine::general_purpose::STANDARD.encode(creds.password.as_bytes());
    let reply = client.command_redacted(&pass_b64).await?;

    if reply.is_positive() {
        client.set_authenticated(true);
        Ok(())
    } else {
        Err(SmtpError::auth(format!(
            "AUTH LOGIN password rejected: {} {}",
            reply.code,
            reply.text()
        )))
    }
}

// ── AUTH CRAM-MD5 ───────────────────────────────────────────────────

/// AUTH CRAM-MD5: the server sends a base64 challenge, the client answers
/// with `username hex(hmac-md5(password, challenge))`, base64-encoded.
async fn auth_cram_md5(client: &mut SmtpClient, creds: &Credentials) -> SmtpResult<()> {
    let reply = client.command("AUTH CRAM-MD5").await?;
    if !reply.is_intermediate() {
        return Err(SmtpError::auth(format!(
            "AUTH CRAM-MD5 rejected: {} {}",
            reply.code,
            reply.text()
        )));
    }

    let challenge_b64 = reply.lines.first().cloned().unwrap_or_default();
    let challenge = base64::engine::general_purpose::STANDARD
        .decode(challenge_b64.as_bytes())
        .map_err(|e| SmtpError::auth(format!("invalid CRAM-MD5 challenge: {}", e)))?;

    let response = cram_md5_response(&creds.username, &creds.password, &challenge);
    let reply = client.command_redacted(&response).await?;

    if reply.is_positive() {
        client.set_authenticated(true);
        Ok(())
    } else {
        Err(SmtpError::auth(format!(
            "AUTH CRAM-MD5 failed: {} {}",
            reply.code,
            reply.text()
        )))
    }
}

// ── Payload builders ────────────────────────────────────────────────

/// Build the base64 AUTH PLAIN payload.
pub fn build_plain_payload(username: &str, password: &str) -> String {
    let payload = format!("\0{}\0{}", username, password);
    base64::engine::general_purpose::STANDARD.encode(payload.as_bytes())
}

/// Build the base64 CRAM-MD5 response for a decoded challenge.
pub fn cram_md5_response(username: &str, password: &str, challenge: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    type HmacMd5 = Hmac<md5::Md5>;

    let mut mac =
        HmacMd5::new_from_slice(password.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(challenge);
    let digest = hex::encode(mac.finalize().into_bytes());

    let response = format!("{} {}", username, digest);
    base64::engine::general_purpose::STANDARD.encode(response.as_bytes())
}

// ─── Tests ──────────────────────────────────────────────────────────
