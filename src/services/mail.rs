//! Outgoing mail.
//!
//! The [`Mailer`] trait abstracts the transport. `SmtpMailer` delivers via
//! lettre; `LogMailer` only logs recipient and subject and is used when no
//! SMTP host is configured (development, tests).

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::{config::Config, error::AppError, models::invoice::{Invoice, format_euro}};

/// File attached to an email.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// An email message to be sent.
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub attachment: Option<MailAttachment>,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: None,
            attachment: None,
        }
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn attach(mut self, attachment: MailAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), AppError>;
}

/// Build the mailer for the configuration: SMTP if a host is set, logging otherwise.
pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>, AppError> {
    match &config.smtp_host {
        Some(host) => Ok(Arc::new(SmtpMailer::new(config, host)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, outgoing mail will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// SMTP mailer using lettre with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &Config, host: &str) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .mail_from
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid MAIL_FROM address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, AppError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Ungültige Empfängeradresse: {e}")))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject);

        let text_part = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(email.text.clone());

        let body = match &email.html {
            Some(html) => MultiPart::alternative().singlepart(text_part).singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            None => MultiPart::mixed().singlepart(text_part),
        };

        let body = match &email.attachment {
            Some(file) => {
                let content_type = ContentType::parse(&file.content_type)
                    .map_err(|e| AppError::Internal(format!("Invalid content type: {e}")))?;
                MultiPart::mixed()
                    .multipart(body)
                    .singlepart(Attachment::new(file.filename.clone()).body(file.data.clone(), content_type))
            }
            None => body,
        };

        builder
            .multipart(body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Upstream(format!("SMTP: {e}")))?;
        tracing::debug!(to = %email.to, subject = %email.subject, "mail sent");
        Ok(())
    }
}

/// Mailer that logs instead of sending. Body content is not logged.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            attachment = email.attachment.as_ref().map(|a| a.filename.as_str()),
            "mail not sent (no SMTP configured)"
        );
        Ok(())
    }
}

pub fn verification_email(to: &str, name: &str, link: &str) -> Email {
    Email::new(
        to,
        "Bitte bestätigen Sie Ihre E-Mail-Adresse",
        format!(
            "Hallo {name},\n\n\
             bitte bestätigen Sie Ihre E-Mail-Adresse über folgenden Link:\n{link}\n\n\
             Der Link ist 24 Stunden gültig.\n"
        ),
    )
}

pub fn password_reset_email(to: &str, name: &str, link: &str) -> Email {
    Email::new(
        to,
        "Passwort zurücksetzen",
        format!(
            "Hallo {name},\n\n\
             Sie haben das Zurücksetzen Ihres Passworts angefordert:\n{link}\n\n\
             Der Link ist eine Stunde gültig. Falls Sie die Anfrage nicht gestellt haben, \
             können Sie diese E-Mail ignorieren.\n"
        ),
    )
}

pub fn invoice_email(to: &str, name: &str, invoice: &Invoice, pdf: Vec<u8>) -> Email {
    Email::new(
        to,
        format!("Ihre Rechnung {}", invoice.number),
        format!(
            "Hallo {name},\n\n\
             vielen Dank für Ihren Einkauf. Im Anhang finden Sie Ihre Rechnung {} \
             über {} ({}).\n",
            invoice.number,
            format_euro(invoice.amount_cents),
            invoice.description
        ),
    )
    .attach(MailAttachment {
        filename: invoice.pdf_filename(),
        content_type: "application/pdf".to_string(),
        data: pdf,
    })
}
