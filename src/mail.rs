//! Outbound mail abstraction.
//!
//! This module defines the [Mailer] trait to abstract mail delivery, enabling
//! testability with a recording mock implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::Error;

/// The URL messages are posted to by [SendGridMailer].
const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// A formatted message with fixed recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The primary recipient address.
    pub to: String,
    /// An optional carbon-copy recipient address.
    pub cc: Option<String>,
    /// The sender address.
    pub from: String,
    /// The subject line.
    pub subject: String,
    /// The plain-text body.
    pub text: String,
    /// The HTML body.
    pub html: String,
}

/// Trait for delivering mail.
///
/// This abstraction allows for different implementations (production vs.
/// testing) and makes the report jobs testable without sending real mail.
#[async_trait]
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Deliver `message`.
    ///
    /// # Errors
    /// Returns an [Error::MailDelivery] if the provider rejects the message
    /// or cannot be reached.
    async fn send(&self, message: &Message) -> Result<(), Error>;
}

/// Production mailer that posts messages to the SendGrid v3 API.
#[derive(Debug, Clone)]
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
}

impl SendGridMailer {
    /// Create a mailer authenticating with `api_key`.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        let mut personalization = json!({ "to": [{ "email": message.to }] });
        if let Some(cc) = &message.cc {
            personalization["cc"] = json!([{ "email": cc }]);
        }

        let body = json!({
            "personalizations": [personalization],
            "from": { "email": message.from },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.text },
                { "type": "text/html", "value": message.html },
            ],
        });

        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                tracing::error!("could not reach the mail provider: {error}");
                Error::MailDelivery(error.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::error!("mail provider returned {status}: {detail}");
            return Err(Error::MailDelivery(format!(
                "mail provider returned {status}"
            )));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "sent mail");
        Ok(())
    }
}

/// Mock mailer for testing.
///
/// Records every message handed to it instead of delivering anything, and can
/// be told to fail the next N sends to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<Message>>>,
    failures_remaining: Arc<Mutex<usize>>,
}

impl MockMailer {
    /// Create a new mock mailer that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to [Mailer::send] fail.
    pub fn fail_next(&self, count: usize) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    /// All messages that have been sent through this mailer.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// The number of messages sent through this mailer.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        {
            let mut failures_remaining = self.failures_remaining.lock().unwrap();
            if *failures_remaining > 0 {
                *failures_remaining -= 1;
                return Err(Error::MailDelivery("mock mailer failure".to_string()));
            }
        }

        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod mock_mailer_tests {
    use crate::Error;

    use super::{Mailer, Message, MockMailer};

    fn test_message() -> Message {
        Message {
            to: "payer@example.com".to_string(),
            cc: None,
            from: "tracker@example.com".to_string(),
            subject: "Test".to_string(),
            text: "hello".to_string(),
            html: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_records_sent_messages() {
        let mailer = MockMailer::new();

        mailer.send(&test_message()).await.unwrap();

        assert_eq!(mailer.sent_count(), 1);
        assert_eq!(mailer.sent()[0].subject, "Test");
    }

    #[tokio::test]
    async fn mock_fails_the_requested_number_of_sends() {
        let mailer = MockMailer::new();
        mailer.fail_next(2);

        assert!(matches!(
            mailer.send(&test_message()).await,
            Err(Error::MailDelivery(_))
        ));
        assert!(matches!(
            mailer.send(&test_message()).await,
            Err(Error::MailDelivery(_))
        ));
        mailer.send(&test_message()).await.unwrap();

        assert_eq!(mailer.sent_count(), 1);
    }
}
