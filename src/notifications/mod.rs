//! Outbound customer notifications.

pub mod email;

use async_trait::async_trait;
use serde::Serialize;

pub use email::{HttpEmailSender, LogEmailSender};

/// Subject line of the guest-account credentials email
pub const CREDENTIALS_SUBJECT: &str = "Welcome New Member!";

/// Outcome of a best-effort delivery; failures are reported, never raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailDelivery {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmailDelivery {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends a freshly generated account password to `email`
    async fn send_credentials(&self, email: &str, password: &str) -> EmailDelivery;
}
