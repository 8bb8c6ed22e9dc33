//! Outbound mail seam.
//!
//! Production deployments plug a real transport in here; the default
//! `DevMailer` logs the links so local flows stay usable without SMTP.

use async_trait::async_trait;
use service_core::error::AppError;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError>;
    async fn send_email_verification(&self, to: &str, link: &str) -> Result<(), AppError>;
}

/// Logs mail instead of sending it.
pub struct DevMailer;

#[async_trait]
impl Mailer for DevMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, link = %link, "password reset mail (dev transport)");
        Ok(())
    }

    async fn send_email_verification(&self, to: &str, link: &str) -> Result<(), AppError> {
        tracing::info!(to = %to, link = %link, "email verification mail (dev transport)");
        Ok(())
    }
}
