// Outgoing email: a dispatch trait, SMTP delivery and a file outbox for development.

pub mod templates;

use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),

    #[error("Failed to write outbox message: {0}")]
    Outbox(#[from] std::io::Error),
}

/// Sends a message with HTML and plain-text alternatives
#[cfg_attr(test, mockall::automock)]
pub trait EmailDispatcher: Send + Sync {
    fn send(&self, to: &[String], subject: &str, html: &str, text: &str) -> Result<(), EmailError>;
}

/// Pick the dispatcher the configuration asks for
pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn EmailDispatcher>, EmailError> {
    if config.smtp_enabled {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(OutboxMailer::new(&config.outbox_dir)))
    }
}

/// SMTP delivery over STARTTLS
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", config.from_email, e)))?;

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| EmailError::Transport(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { transport, from })
    }
}

impl EmailDispatcher for SmtpMailer {
    fn send(&self, to: &[String], subject: &str, html: &str, text: &str) -> Result<(), EmailError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in to {
            let mailbox = recipient
                .parse::<Mailbox>()
                .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", recipient, e)))?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(text.to_string(), html.to_string()))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        info!("Email '{}' sent to {} recipient(s)", subject, to.len());
        Ok(())
    }
}

/// Writes each message to a file instead of sending it
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: &str) -> Self {
        Self { dir: PathBuf::from(dir) }
    }
}

impl EmailDispatcher for OutboxMailer {
    fn send(&self, to: &[String], subject: &str, html: &str, text: &str) -> Result<(), EmailError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!(
            "{}_{}.eml.txt",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4()
        ));
        let contents = format!(
            "To: {}\nSubject: {}\n\n{}\n\n--- html ---\n{}\n",
            to.join(", "),
            subject,
            text,
            html
        );
        fs::write(&path, contents)?;

        debug!("Email '{}' written to {}", subject, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_outbox_writes_message() {
        let dir = tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let mailer = OutboxMailer::new(outbox.to_str().unwrap());

        mailer
            .send(&["ana@example.com".to_string()], "Hello", "<p>Hi</p>", "Hi")
            .unwrap();

        let files: Vec<_> = fs::read_dir(&outbox).unwrap().collect();
        assert_eq!(files.len(), 1);
        let contents = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(contents.contains("To: ana@example.com"));
        assert!(contents.contains("Subject: Hello"));
        assert!(contents.contains("<p>Hi</p>"));
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_sender() {
        let mut config = crate::config::Config::default().email;
        config.from_email = "not an address".to_string();

        assert!(matches!(SmtpMailer::new(&config), Err(EmailError::InvalidAddress(_))));
    }
}
