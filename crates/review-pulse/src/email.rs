use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::error::AppError;

pub const SUBJECT: &str = "Weekly App Review Pulse";

/// SMTP delivery settings. Only built when sender and password are both configured.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub sender: String,
    pub password: String,
    pub receiver: String,
    pub host: String,
    pub port: u16,
}

pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn build_message(&self, html: &str) -> Result<Message, AppError> {
        Message::builder()
            .from(
                self.config
                    .sender
                    .parse()
                    .map_err(|e| AppError::Email(format!("invalid sender address: {e}")))?,
            )
            .to(self
                .config
                .receiver
                .parse()
                .map_err(|e| AppError::Email(format!("invalid receiver address: {e}")))?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| AppError::Email(format!("failed to build email: {e}")))
    }

    /// Sends the report over implicit TLS. The SMTP exchange is blocking and runs on the
    /// blocking pool.
    pub async fn send(&self, html: &str) -> Result<(), AppError> {
        let message = self.build_message(html)?;
        let config = self.config.clone();

        info!(sender = %config.sender, host = %config.host, port = config.port, "sending report email");
        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(config.sender.clone(), config.password.clone());
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| AppError::Email(format!("SMTP setup failed: {e}")))?
                .port(config.port)
                .credentials(creds)
                .build();
            transport
                .send(&message)
                .map_err(|e| AppError::Email(format!("SMTP send failed: {e}")))?;
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Email(format!("email task failed: {e}")))??;

        info!(receiver = %self.config.receiver, "report email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(receiver: &str) -> SmtpConfig {
        SmtpConfig {
            sender: "pulse@example.com".into(),
            password: "secret".into(),
            receiver: receiver.into(),
            host: "smtp.example.com".into(),
            port: 465,
        }
    }

    #[test]
    fn builds_html_message_with_subject() {
        let mailer = Mailer::new(config("team@example.com"));
        let message = mailer.build_message("<h2>Pulse</h2>").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Weekly App Review Pulse"));
        assert!(raw.contains("From: pulse@example.com"));
        assert!(raw.contains("To: team@example.com"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains("<h2>Pulse</h2>"));
    }

    #[test]
    fn invalid_receiver_is_rejected() {
        let mailer = Mailer::new(config("not an address"));
        assert!(matches!(
            mailer.build_message("x"),
            Err(AppError::Email(msg)) if msg.contains("receiver")
        ));
    }
}
