//! End-to-end SMTP send flow against a scripted in-process server.

use std::sync::{Arc, Mutex};

use slurmail_notify::config::NotifierConfig;
use slurmail_notify::notifier::{unix_now, Notifier};
use slurmail_smtp::auth::{build_plain_payload, cram_md5_response};
use slurmail_smtp::client;
use slurmail_smtp::message::MessageBuilder;
use slurmail_smtp::types::{
    AuthMethod, Credentials, EmailAddress, SmtpConfig, SmtpErrorKind, SmtpSecurity,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// base64("<1896.697170952@mock>"), handed out for AUTH CRAM-MD5
const CRAM_CHALLENGE_B64: &str = "PDE4OTYuNjk3MTcwOTUyQG1vY2s+";
const CRAM_CHALLENGE: &[u8] = b"<1896.697170952@mock>";

#[derive(Clone, Copy)]
enum MockBehavior {
    AcceptAll,
    RejectRcpt,
}

/// Spawn a one-session SMTP server on an ephemeral port. Returns the
/// port, a transcript of client lines, and the server task handle.
async fn spawn_mock_server(
    behavior: MockBehavior,
) -> (u16, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let transcript = Arc::new(Mutex::new(Vec::new()));
    let log = transcript.clone();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        run_session(stream, behavior, log).await;
    });

    (port, transcript, handle)
}

async fn run_session(stream: TcpStream, behavior: MockBehavior, log: Arc<Mutex<Vec<String>>>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half
        .write_all(b"220 mock ESMTP ready\r\n")
        .await
        .unwrap();

    let mut in_data = false;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            return;
        }
        let trimmed = line.trim_end().to_string();

        if in_data {
            log.lock().unwrap().push(format!("DATA> {}", trimmed));
            if trimmed == "." {
                in_data = false;
                write_half
                    .write_all(b"250 2.0.0 Ok: queued\r\n")
                    .await
                    .unwrap();
            }
            continue;
        }

        log.lock().unwrap().push(trimmed.clone());
        let upper = trimmed.to_ascii_uppercase();

        let reply = if upper.starts_with("EHLO") {
            "250-mock.local\r\n250-SIZE 1048576\r\n250-AUTH PLAIN LOGIN CRAM-MD5\r\n250 8BITMIME\r\n"
                .to_string()
        } else if upper.starts_with("AUTH CRAM-MD5") {
            format!("334 {}\r\n", CRAM_CHALLENGE_B64)
        } else if upper.starts_with("AUTH") {
            "235 2.7.0 Authentication successful\r\n".to_string()
        } else if upper.starts_with("MAIL FROM") {
            "250 OK\r\n".to_string()
        } else if upper.starts_with("RCPT TO") {
            match behavior {
                MockBehavior::RejectRcpt => "550 5.1.1 no such user\r\n".to_string(),
                MockBehavior::AcceptAll => "250 OK\r\n".to_string(),
            }
        } else if upper.starts_with("DATA") {
            in_data = true;
            "354 End data with <CR><LF>.<CR><LF>\r\n".to_string()
        } else if upper.starts_with("QUIT") {
            write_half.write_all(b"221 Bye\r\n").await.unwrap();
            return;
        } else {
            // CRAM-MD5 challenge response and anything else
            "250 OK\r\n".to_string()
        };
        write_half.write_all(reply.as_bytes()).await.unwrap();
    }
}

fn mock_config(port: u16, method: Option<AuthMethod>) -> NotifierConfig {
    let mut creds = Credentials::new("tim", "tanstaaftanstaaf");
    creds.method = method;
    NotifierConfig {
        smtp: SmtpConfig {
            host: "127.0.0.1".into(),
            port,
            security: SmtpSecurity::None,
            credentials: Some(creds),
            ..SmtpConfig::default()
        },
        from: EmailAddress::new("bot@example.com"),
        to: EmailAddress::new("ops@example.com"),
    }
}

#[tokio::test]
async fn test_start_notification_full_session() {
    let (port, transcript, handle) = spawn_mock_server(MockBehavior::AcceptAll).await;

    let notifier = Notifier::new(mock_config(port, Some(AuthMethod::Plain)));
    notifier
        .notify_job_start("4242", "train_model", unix_now() - 125.0)
        .await
        .unwrap();
    handle.await.unwrap();

    let lines = transcript.lock().unwrap().clone();
    assert_eq!(lines[0], "EHLO localhost");
    let auth = format!(
        "AUTH PLAIN {}",
        build_plain_payload("tim", "tanstaaftanstaaf")
    );
    assert!(lines.contains(&auth));
    assert!(lines.contains(&"MAIL FROM:<bot@example.com>".to_string()));
    assert!(lines.contains(&"RCPT TO:<ops@example.com>".to_string()));
    assert!(lines.contains(&"DATA".to_string()));
    assert!(lines.contains(&"QUIT".to_string()));

    // Rendered message made it across intact.
    assert!(lines.iter().any(|l| l == "DATA> To: ops@example.com"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("DATA> Subject: [SLURM] Job train_model (4242) started (queued 2m")));
    assert!(lines.iter().any(|l| l == "DATA> SLURM Job Started"));
    assert!(lines.iter().any(|l| l == "DATA> Job ID: 4242"));
    assert!(lines.iter().any(|l| l == "DATA> ."));
}

#[tokio::test]
async fn test_finish_notification_reports_failure() {
    let (port, transcript, handle) = spawn_mock_server(MockBehavior::AcceptAll).await;

    let notifier = Notifier::new(mock_config(port, Some(AuthMethod::Plain)));
    notifier
        .notify_job_finish("4242", "train_model", unix_now() - 3700.0, 143)
        .await
        .unwrap();
    handle.await.unwrap();

    let lines = transcript.lock().unwrap().clone();
    assert!(lines
        .iter()
        .any(|l| l.starts_with("DATA> Subject: [SLURM] Job train_model (4242) FAILED (runtime 1h")));
    assert!(lines.iter().any(|l| l == "DATA> Status: FAILED"));
    assert!(lines.iter().any(|l| l == "DATA> Exit Code: 143"));
}

#[tokio::test]
async fn test_recipient_rejection_surfaces_error() {
    let (port, _transcript, handle) = spawn_mock_server(MockBehavior::RejectRcpt).await;

    let cfg = mock_config(port, Some(AuthMethod::Plain));
    let msg = MessageBuilder::new()
        .from(cfg.from.clone())
        .to(cfg.to.clone())
        .subject("Test")
        .text("Body\n")
        .build()
        .unwrap();
    let err = client::send_message(cfg.smtp, &msg).await.unwrap_err();
    handle.await.unwrap();

    assert_eq!(err.kind, SmtpErrorKind::ServerReply);
    assert_eq!(err.code, Some(550));
    assert!(err.message.contains("ops@example.com"));
}

#[tokio::test]
async fn test_starttls_unavailable_aborts_before_envelope() {
    let (port, transcript, handle) = spawn_mock_server(MockBehavior::AcceptAll).await;

    // The mock EHLO advertisement carries no STARTTLS.
    let mut cfg = mock_config(port, Some(AuthMethod::Plain));
    cfg.smtp.security = SmtpSecurity::StartTls;
    let msg = MessageBuilder::new()
        .from(cfg.from.clone())
        .to(cfg.to.clone())
        .subject("Test")
        .text("Body\n")
        .build()
        .unwrap();
    let err = client::send_message(cfg.smtp, &msg).await.unwrap_err();
    handle.await.unwrap();

    assert_eq!(err.kind, SmtpErrorKind::TlsError);
    assert!(err.message.contains("STARTTLS"));

    // Aborted before the upgrade attempt, so neither credentials nor
    // the envelope ever crossed the wire. The session closed cleanly.
    let lines = transcript.lock().unwrap().clone();
    assert!(!lines.iter().any(|l| l.starts_with("STARTTLS")));
    assert!(!lines.iter().any(|l| l.starts_with("AUTH")));
    assert!(!lines.iter().any(|l| l.starts_with("MAIL FROM")));
    assert!(lines.contains(&"QUIT".to_string()));
}

#[tokio::test]
async fn test_cram_md5_negotiated_when_unpinned() {
    let (port, transcript, handle) = spawn_mock_server(MockBehavior::AcceptAll).await;

    // No pinned mechanism: the client should pick CRAM-MD5 over
    // PLAIN/LOGIN from the EHLO advertisement.
    let cfg = mock_config(port, None);
    let msg = MessageBuilder::new()
        .from(cfg.from.clone())
        .to(cfg.to.clone())
        .subject("Test")
        .text("Body\n")
        .build()
        .unwrap();
    client::send_message(cfg.smtp, &msg).await.unwrap();
    handle.await.unwrap();

    let lines = transcript.lock().unwrap().clone();
    assert!(lines.contains(&"AUTH CRAM-MD5".to_string()));
    let expected = cram_md5_response("tim", "tanstaaftanstaaf", CRAM_CHALLENGE);
    assert!(lines.contains(&expected));
}

#[tokio::test]
async fn test_mock_challenge_constant_is_consistent() {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(CRAM_CHALLENGE_B64)
        .unwrap();
    assert_eq!(decoded, CRAM_CHALLENGE);
}
