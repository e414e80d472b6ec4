use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

/// Outbound mail for the email queue.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host).ok()?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).ok()?
        };
        let transport = builder.port(port).credentials(creds).build();

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("Invalid recipient address: {to}"))?;

        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_text(html)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }
}

/// Records messages instead of sending them. Used when SMTP is not configured.
#[derive(Default)]
pub struct DryRunMail {
    sent: Mutex<Vec<(String, String)>>,
}

impl DryRunMail {
    pub fn new() -> Self {
        Self::default()
    }

    /// (to, subject) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MailTransport for DryRunMail {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send(&self, to: &str, subject: &str, _html: &str) -> anyhow::Result<()> {
        if !to.contains('@') {
            anyhow::bail!("Invalid recipient address: {to}");
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), subject.to_string()));
        }
        tracing::debug!("SMTP not configured, dropping mail to {to}");
        Ok(())
    }
}

/// Crude tag stripper for the text/plain alternative.
fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_drops_markup() {
        assert_eq!(plain_text("<p>Bus <b>12</b> is late</p>"), "Bus 12 is late");
    }

    #[test]
    fn smtp_requires_full_config() {
        let config = Config::local("secret");
        assert!(SmtpMailer::new(&config).is_none());
    }

    #[tokio::test]
    async fn dry_run_records_and_rejects_bad_addresses() {
        let mail = DryRunMail::new();
        mail.send("parent1@mybus.com", "Hi", "<p>x</p>").await.unwrap();
        assert!(mail.send("nobody", "Hi", "").await.is_err());
        assert_eq!(mail.sent(), vec![("parent1@mybus.com".to_string(), "Hi".to_string())]);
    }
}
