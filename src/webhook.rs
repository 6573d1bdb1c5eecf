//! Registration approval webhook.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use url::Url;

use crate::config::{Webhook as WebhookIdentity, append_path};
use crate::error::Result;

const EMBED_COLOR: u32 = 11821768;
const APPROVALS_PATH: [&str; 2] = ["admin", "approvals"];

/// JSON body posted to the approval webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub description: String,
    pub fields: Vec<Field>,
    pub footer: Footer,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footer {
    pub text: String,
    pub icon_url: String,
}

impl ApprovalRequest {
    /// Build the registration notice for `username` and `email`.
    pub fn new(
        identity: &WebhookIdentity,
        app_name: &str,
        app_url: &Url,
        username: &str,
        email: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let approve = append_path(app_url, &APPROVALS_PATH)?;

        Ok(Self {
            username: identity.username.clone(),
            avatar_url: identity.avatar_url.clone(),
            embeds: vec![Embed {
                title: format!("{app_name} - Registration Request"),
                color: EMBED_COLOR,
                description: format!(
                    "A new user account has been created on {app_name}"
                ),
                fields: vec![
                    Field::new("Username:", username),
                    Field::new("Email:", email),
                    Field::new("Approve:", approve.as_str()),
                ],
                footer: Footer {
                    text: identity.username.clone(),
                    icon_url: identity.avatar_url.clone(),
                },
                timestamp: timestamp
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
            }],
        })
    }
}

impl Field {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// Port for outbound webhook calls.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// POST `payload` as JSON to `url`.
    async fn post(&self, url: &str, payload: &ApprovalRequest) -> Result<()>;
}

/// [`reqwest`] webhook client.
#[derive(Clone, Debug, Default)]
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl HttpWebhook {
    /// Create a new [`HttpWebhook`].
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookClient for HttpWebhook {
    async fn post(&self, url: &str, payload: &ApprovalRequest) -> Result<()> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(%status, "approval webhook delivered");
        } else {
            tracing::warn!(%status, "approval webhook rejected");
        }

        Ok(())
    }
}
