//! Mailer that records outgoing mail in the log instead of delivering it.

use an_core::Mailer;
use async_trait::async_trait;
use tracing::info;

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        info!(to, subject, bytes = html_body.len(), "mail queued (log only)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_fails() {
        assert!(LogMailer.send("a@example.org", "hi", "<p>x</p>").await.is_ok());
    }
}
