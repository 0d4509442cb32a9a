use crate::AppError;
use crate::Result;
use crate::config::SmtpConfig;
use crate::models::Notification;
use crate::plugins::traits::MailTransport;
use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP over implicit TLS, authenticated with the sender account.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = Mailbox::new(Some(config.from_name.clone()), config.username.parse()?);
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { mailer, from })
    }

    /// Connects and authenticates without sending anything.
    pub async fn test_connection(&self) -> bool {
        match self.mailer.test_connection().await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "SMTP connection test failed");
                false
            }
        }
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        build_message(&self.from, notification)
    }
}

fn build_message(from: &Mailbox, notification: &Notification) -> Result<Message> {
    if notification.recipients.is_empty() {
        return Err(AppError::Validation("notification has no recipients".to_string()));
    }

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(notification.subject.clone())
        .header(header::ContentType::TEXT_PLAIN);

    for recipient in &notification.recipients {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }

    Ok(builder.body(notification.body.clone())?)
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let email = self.build_message(notification)?;
        self.mailer.send(email).await?;
        Ok(())
    }
}
