//! Console notifier for development and testing.

use super::{DeliveryReport, Notifier};
use crate::error::Result;
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use tracing::info;

/// Console notifier.
///
/// This notifier logs codes to the console instead of sending them.
/// Useful for development where you don't want to send real messages.
///
/// # Examples
///
/// ```ignore
/// use keystone_auth::providers::ConsoleNotifier;
///
/// let notifier = ConsoleNotifier::new();
/// notifier.send("user@example.com", "123456", OtpPurpose::Login, expires_at).await?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Create a new console notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Notifier for ConsoleNotifier {
    async fn send(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let expires_minutes = (expires_at - Utc::now()).num_minutes();

        info!(
            to = %identifier,
            purpose = %purpose,
            code = %code,
            expires_in = %expires_minutes,
            "📧 One-time code (Development Mode)"
        );
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     ONE-TIME CODE                            ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ To: {identifier:<57}║");
        println!("║ Purpose: {purpose:<52}║");
        println!("║ Code: {code:<55}║");
        println!("║ Expires in {expires_minutes} minutes{:<40}║", "");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        Ok(DeliveryReport::delivered("printed to console"))
    }
}
