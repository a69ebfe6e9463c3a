use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{EmailDelivery, EmailSender, CREDENTIALS_SUBJECT};
use crate::config::AppConfig;

#[derive(Debug, Error)]
enum EmailError {
    #[error("email provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("email provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct ProviderReply {
    #[serde(default, alias = "messageId")]
    id: Option<String>,
}

fn credentials_body(email: &str, password: &str) -> String {
    format!(
        "Welcome! An account was created for {email} when you placed your order.\n\n\
         Sign in with this email and the password below, then change it from your profile.\n\n\
         Password: {password}\n"
    )
}

/// Sends mail through a JSON HTTP email provider
#[derive(Clone)]
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailSender {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            from: from.into(),
        })
    }

    /// Returns `None` when no provider endpoint is configured
    pub fn from_config(cfg: &AppConfig) -> Result<Option<Self>, reqwest::Error> {
        match cfg.email_api_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(Some(Self::new(
                url,
                cfg.email_api_key.clone(),
                cfg.email_from.clone(),
            )?)),
            _ => Ok(None),
        }
    }

    async fn post(&self, email: &str, password: &str) -> Result<Option<String>, EmailError> {
        let message = OutgoingEmail {
            from: &self.from,
            to: email,
            subject: CREDENTIALS_SUBJECT,
            text: credentials_body(email, password),
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply = response.json::<ProviderReply>().await.ok();
        Ok(reply.and_then(|r| r.id))
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    #[instrument(skip(self, password))]
    async fn send_credentials(&self, email: &str, password: &str) -> EmailDelivery {
        match self.post(email, password).await {
            Ok(message_id) => {
                info!(message_id = ?message_id, "Credentials email sent");
                EmailDelivery::delivered(message_id)
            }
            Err(e) => {
                warn!(error = %e, "Credentials email failed");
                EmailDelivery::failed(e.to_string())
            }
        }
    }
}

/// Used when no provider is configured: records that delivery was skipped
#[derive(Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_credentials(&self, email: &str, _password: &str) -> EmailDelivery {
        warn!(
            email,
            "Email provider not configured; guest credentials were not delivered"
        );
        EmailDelivery::failed("email provider not configured")
    }
}
