//! One-shot notification delivery.

use chrono::{Local, Utc};
use log::{debug, info};
use slurmail_smtp::client;
use slurmail_smtp::message::MessageBuilder;

use crate::compose::{self, Notification};
use crate::config::NotifierConfig;
use crate::duration::format_duration;
use crate::error::NotifyResult;

/// Sends job lifecycle notifications. Stateless apart from its
/// configuration; each call opens one SMTP session and closes it.
pub struct Notifier {
    config: NotifierConfig,
    dry_run: bool,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    /// In dry-run mode the composed notification is logged instead of
    /// sent, so hook scripts can be rehearsed without real mail.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Notify that a job has left the queue and started running.
    /// `submit_time` is the Unix timestamp of submission.
    pub async fn notify_job_start(
        &self,
        job_id: &str,
        job_name: &str,
        submit_time: f64,
    ) -> NotifyResult<()> {
        let started_at = Local::now();
        let queued = format_duration(unix_now() - submit_time);
        let n = compose::job_started(job_id, job_name, started_at, &queued);
        self.deliver(n).await
    }

    /// Notify that a job has finished. `start_time` is the Unix
    /// timestamp at which the job began running.
    pub async fn notify_job_finish(
        &self,
        job_id: &str,
        job_name: &str,
        start_time: f64,
        exit_code: i32,
    ) -> NotifyResult<()> {
        let finished_at = Local::now();
        let runtime = format_duration(unix_now() - start_time);
        let n = compose::job_finished(job_id, job_name, finished_at, exit_code, &runtime);
        self.deliver(n).await
    }

    async fn deliver(&self, n: Notification) -> NotifyResult<()> {
        if self.dry_run {
            info!("dry run, not sending");
            info!("To: {}", self.config.to.to_mailbox());
            info!("Subject: {}", n.subject);
            for line in n.body.lines() {
                info!("  {}", line);
            }
            return Ok(());
        }

        let msg = MessageBuilder::new()
            .from(self.config.from.clone())
            .to(self.config.to.clone())
            .subject(n.subject)
            .text(n.body)
            .build()?;
        debug!("delivering {} to {}", msg.id, self.config.to.address);
        let reply = client::send_message(self.config.smtp.clone(), &msg).await?;
        info!("notification accepted: {}", reply.text());
        Ok(())
    }
}

/// Current Unix time as fractional seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use slurmail_smtp::types::{EmailAddress, SmtpConfig};

    fn test_config() -> NotifierConfig {
        NotifierConfig {
            smtp: SmtpConfig::default(),
            from: EmailAddress::new("bot@example.com"),
            to: EmailAddress::new("ops@example.com"),
        }
    }

    #[tokio::test]
    async fn dry_run_skips_delivery() {
        // Config has no reachable host, so a real send would error.
        let notifier = Notifier::new(test_config()).with_dry_run(true);
        notifier
            .notify_job_start("42", "nightly", unix_now() - 90.0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dry_run_covers_finish_path() {
        let notifier = Notifier::new(test_config()).with_dry_run(true);
        notifier
            .notify_job_finish("42", "nightly", unix_now() - 3700.0, 1)
            .await
            .unwrap();
    }

    #[test]
    fn unix_now_is_fractional_seconds() {
        let t = unix_now();
        // Sometime after 2024, well before 2100.
        assert!(t > 1_700_000_000.0 && t < 4_100_000_000.0);
    }
}
