//! SMTP email channel
//!
//! Credentials come from `SMTP_USERNAME` / `SMTP_PASSWORD` when both are set.
//! Port 465 uses implicit TLS, any other port STARTTLS unless `tls: false`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AlertNotification, ChannelError, ChannelKind, Notifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub tls: Option<bool>,
    pub from: String,
    pub to: Vec<String>,
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, ChannelError> {
        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(ChannelError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let port = config.smtp_port.unwrap_or(587);
        let host = config.smtp_host.as_str();
        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| ChannelError::Config(e.to_string()))?
        } else if config.tls.unwrap_or(true) {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| ChannelError::Config(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(port);

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn subject(notification: &AlertNotification) -> String {
        format!("[cronjob-guardian][{}] {}", notification.severity, notification.title())
    }

    fn body(notification: &AlertNotification) -> String {
        let mut lines = vec![
            notification.message.clone(),
            String::new(),
            format!("Job:      {}", notification.job),
            format!("Monitor:  {}", notification.monitor),
            format!("Type:     {}", notification.alert_type),
            format!("Severity: {}", notification.severity),
            format!("Since:    {}", notification.since.to_rfc3339()),
        ];
        if let Some(failure) = &notification.failure {
            if let Some(run) = &failure.job_run {
                lines.push(format!("Run:      {}", run));
            }
            if let Some(code) = failure.exit_code {
                lines.push(format!("Exit:     {}", code));
            }
            if let Some(reason) = &failure.reason {
                lines.push(format!("Reason:   {}", reason));
            }
        }
        if let Some(suggestion) = &notification.suggestion {
            lines.push(String::new());
            lines.push(format!("Suggested fix: {}", suggestion));
        }
        lines.join("\n")
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &AlertNotification) -> Result<(), ChannelError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(notification))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        let message = builder
            .body(Self::body(notification))
            .map_err(|e| ChannelError::Smtp(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ChannelError::Smtp(e.to_string()))?;

        debug!(channel = "email", recipients = self.to.len(), "Email notification delivered");
        Ok(())
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, ChannelError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| {
            ChannelError::Config(format!("invalid address '{}': {}", addr, e))
        })
}
