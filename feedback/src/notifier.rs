use crate::config::{NotificationConfig, SmtpConfig, SmtpSecurity};
use crate::errors::NotifyError;
use crate::metrics_defs::NOTIFICATIONS;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Delivers the body of a feedback notification to the maintainers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, body: &str) -> Result<(), NotifyError>;
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
    subject: String,
}

impl SmtpNotifier {
    pub fn new(smtp: &SmtpConfig, notification: &NotificationConfig) -> Result<Self, NotifyError> {
        let builder = match smtp.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp.host.as_str())
            }
        };

        let mut builder = builder
            .port(smtp.port())
            .timeout(Some(Duration::from_secs(smtp.timeout_secs)));

        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let sender = notification.sender.parse::<Mailbox>()?;
        let recipients = notification
            .recipients
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SmtpNotifier {
            transport: builder.build(),
            sender,
            recipients,
            subject: notification.subject.clone(),
        })
    }

    fn message(&self, body: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        Ok(builder.body(body.to_string())?)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, body: &str) -> Result<(), NotifyError> {
        let message = self.message(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Sends notifications off the response path. Failures are logged and
/// counted; the submitter never sees them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        NotificationDispatcher { notifier, timeout }
    }

    pub fn dispatch(&self, body: String) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let limit = self.timeout;

        tokio::spawn(async move {
            let result = match timeout(limit, notifier.notify(&body)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(limit)),
            };

            match result {
                Ok(()) => {
                    tracing::info!("Sent feedback notification");
                    counter!(NOTIFICATIONS, "outcome" => "sent").increment(1);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to send feedback notification");
                    counter!(NOTIFICATIONS, "outcome" => "failed").increment(1);
                }
            }
        })
    }
}
