//! SMTP notifier implementation using Lettre.

use super::{DeliveryReport, Notifier};
use crate::error::{AuthError, Result};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP notifier using Lettre.
///
/// Sends one-time codes by e-mail, suitable for production use. Permanent
/// SMTP rejections are reported as a refused [`DeliveryReport`]; transport
/// failures are errors.
///
/// # Examples
///
/// ```ignore
/// use keystone_auth::providers::SmtpNotifier;
///
/// let notifier = SmtpNotifier::new(
///     "smtp.example.com",
///     587,
///     "mailer".to_string(),
///     "app_password".to_string(),
///     "noreply@example.com".to_string(),
///     "Example Platform".to_string(),
/// )?;
/// ```
#[derive(Clone)]
pub struct SmtpNotifier {
    /// Pooled async transport.
    transport: AsyncSmtpTransport<Tokio1Executor>,

    /// Sender email address.
    from_email: String,

    /// Sender display name.
    from_name: String,
}

impl SmtpNotifier {
    /// Create a new SMTP notifier.
    ///
    /// # Errors
    ///
    /// Returns error if the relay address is invalid.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_server)
            .map_err(|e| AuthError::DeliveryFailed(format!("SMTP relay error: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(smtp_username, smtp_password))
            .build();

        Ok(Self {
            transport,
            from_email,
            from_name,
        })
    }

    /// Build the "From" header.
    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    const fn subject(purpose: OtpPurpose) -> &'static str {
        match purpose {
            OtpPurpose::Signup => "Confirm your email address",
            OtpPurpose::Login => "Your sign-in code",
            OtpPurpose::PasswordReset => "Your password reset code",
        }
    }
}

impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let expires_minutes = (expires_at - Utc::now()).num_minutes().max(1);
        let subject = Self::subject(purpose);

        let html_body = format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{subject}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #2563eb;">{subject}</h2>
        <p>Your one-time code is:</p>
        <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
        <p>This code will expire in {expires_minutes} minutes and can only be used once.</p>
        <p style="color: #666; font-size: 14px;">
            If you didn't request this code, you can safely ignore this email.
        </p>
    </div>
</body>
</html>
            "#
        );

        let email = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| AuthError::DeliveryFailed(format!("Invalid from address: {e}")))?,
            )
            .to(identifier
                .parse()
                .map_err(|e| AuthError::DeliveryFailed(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| AuthError::DeliveryFailed(format!("Failed to build email: {e}")))?;

        match self.transport.send(email).await {
            Ok(response) => Ok(DeliveryReport::delivered(response.code().to_string())),
            Err(e) if e.is_permanent() => {
                tracing::warn!(purpose = %purpose, error = %e, "SMTP server refused one-time code");
                Ok(DeliveryReport::refused(e.to_string()))
            }
            Err(e) => Err(AuthError::DeliveryFailed(format!("Failed to send email: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_differ_per_purpose() {
        assert_ne!(
            SmtpNotifier::subject(OtpPurpose::Login),
            SmtpNotifier::subject(OtpPurpose::PasswordReset)
        );
    }

    #[tokio::test]
    async fn malformed_recipient_fails_before_sending() {
        let notifier = SmtpNotifier::new(
            "smtp.example.invalid",
            587,
            "user".into(),
            "pass".into(),
            "noreply@example.com".into(),
            "Keystone".into(),
        )
        .unwrap();

        let result = notifier
            .send("+15551234567", "123456", OtpPurpose::Login, Utc::now())
            .await;

        assert!(matches!(result, Err(AuthError::DeliveryFailed(_))));
    }
}
