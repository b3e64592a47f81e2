use std::sync::Arc;

use futures_util::future::BoxFuture;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email. Failures are reported to the caller but never fail the
/// request that triggered the email; see [`send_in_background`].
pub trait Mailer: Send + Sync {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Used when SMTP is not configured: emails are only logged.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            info!(to = %email.to, subject = %email.subject, "Email (not sent, SMTP disabled)");
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds a TLS relay transport. Credentials are optional for relays that
    /// accept unauthenticated mail.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: &str,
    ) -> anyhow::Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM address '{from}': {e}"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(port);
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, anyhow::Result<()>> {
        let transport = self.transport.clone();
        let from = self.from.clone();
        Box::pin(async move {
            let to: Mailbox = email
                .to
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid recipient '{}': {e}", email.to))?;

            let message = Message::builder()
                .from(from)
                .to(to)
                .subject(email.subject)
                .header(ContentType::TEXT_PLAIN)
                .body(email.body)?;

            transport.send(message).await?;
            debug!(to = %email.to, "Email sent");
            Ok(())
        })
    }
}

/// Sends on a background task; errors are logged and dropped.
pub fn send_in_background(mailer: Arc<dyn Mailer>, email: OutgoingEmail) {
    tokio::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            warn!("Failed to send email to {}: {:#}", to, e);
        }
    });
}
