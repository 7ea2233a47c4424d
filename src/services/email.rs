//! E-mail delivery of hold-ready notices

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;
use std::sync::Arc;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::HoldReadyNotice,
};

use super::{notifications::NotificationDispatcher, patrons::PatronDirectory};

#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
    patrons: Arc<dyn PatronDirectory>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, patrons: Arc<dyn PatronDirectory>) -> Self {
        Self { config, patrons }
    }

    fn hold_ready_body(notice: &HoldReadyNotice) -> String {
        format!(
            r#"
A title you reserved is now checked out to you.

Loan reference: {loan}
Due date: {due}

If you no longer need it, please return it so the next reader can have it.
"#,
            loan = notice.loan_id,
            due = notice.due_date.format("%Y-%m-%d"),
        )
    }

    /// Build the message and hand it to the SMTP relay
    fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Elidune");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        mailer_builder
            .build()
            .send(&email)
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for EmailNotifier {
    async fn hold_ready(&self, notice: HoldReadyNotice) -> AppResult<()> {
        let Some(to) = self.patrons.contact_email(notice.patron_id).await? else {
            tracing::debug!("No e-mail address for patron {}, skipping notice", notice.patron_id);
            return Ok(());
        };

        let notifier = self.clone();
        let body = Self::hold_ready_body(&notice);
        // The SMTP transport blocks
        tokio::task::spawn_blocking(move || notifier.send_email(&to, "Your reserved title is ready", &body))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
    }
}
