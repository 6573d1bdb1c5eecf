//! Account creation.

use std::sync::Arc;

use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::config::Webhook as WebhookIdentity;
use crate::crypto::{PasswordHasher, random_string};
use crate::database::Transactional;
use crate::error::Result;
use crate::mail::Notifier;
use crate::settings::{
    APP_NAME, APPROVALS_WEBHOOK, APPROVALS_WEBHOOK_URL, SettingsRepository,
};
use crate::user::{NewUser, PasswordBroker, User, UserData, UserRepository};
use crate::webhook::{ApprovalRequest, WebhookClient};

/// Length of the throwaway password given to passwordless accounts.
pub const RANDOM_PASSWORD_LENGTH: usize = 30;
pub const DEFAULT_APP_NAME: &str = "Jexactyl";

/// Creates users on the panel.
pub struct UserCreationService<C: Transactional> {
    connection: C,
    hasher: Arc<dyn PasswordHasher>,
    password_broker: Box<dyn PasswordBroker<C::Transaction>>,
    repository: Box<dyn UserRepository<C::Transaction>>,
    settings: Box<dyn SettingsRepository>,
    webhook: Box<dyn WebhookClient>,
    notifier: Box<dyn Notifier>,
    identity: WebhookIdentity,
    app_name: String,
    app_url: Url,
}

impl<C: Transactional> UserCreationService<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection: C,
        hasher: Arc<dyn PasswordHasher>,
        password_broker: Box<dyn PasswordBroker<C::Transaction>>,
        repository: Box<dyn UserRepository<C::Transaction>>,
        settings: Box<dyn SettingsRepository>,
        webhook: Box<dyn WebhookClient>,
        notifier: Box<dyn Notifier>,
        app_url: Url,
    ) -> Self {
        Self {
            connection,
            hasher,
            password_broker,
            repository,
            settings,
            webhook,
            notifier,
            identity: WebhookIdentity::default(),
            app_name: DEFAULT_APP_NAME.to_owned(),
            app_url,
        }
    }

    /// Update webhook author.
    pub fn with_identity(mut self, identity: WebhookIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Update name used when `settings::app:name` is unset.
    pub fn with_app_name(mut self, name: &str) -> Self {
        self.app_name = name.to_owned();
        self
    }

    /// Create a new user on the system.
    ///
    /// Without a password, the account gets an unusable random one and a reset
    /// token is sent alongside the notification.
    pub async fn handle(&self, mut data: UserData) -> Result<User> {
        let password = match data.password.take().filter(|p| !p.is_empty()) {
            Some(password) => Some(self.hasher.make(&password)?),
            None => None,
        };

        let mut tx = self.connection.begin().await?;

        let generate_reset_token = password.is_none();
        let password = match password {
            Some(password) => password,
            None => self.hasher.make(&random_string(RANDOM_PASSWORD_LENGTH))?,
        };

        let submitted = (data.username.clone(), data.email.clone());
        let user = self
            .repository
            .create(&mut tx, NewUser::from_data(data, Uuid::new_v4(), password))
            .await?;

        let token = if generate_reset_token {
            Some(self.password_broker.create_token(&mut tx, &user).await?)
        } else {
            None
        };

        if let Some(url) = self.webhook_url().await? {
            let name = self.settings.get_or(APP_NAME, &self.app_name).await?;
            let payload = ApprovalRequest::new(
                &self.identity,
                &name,
                &self.app_url,
                &submitted.0,
                &submitted.1,
                Utc::now(),
            )?;

            self.webhook.post(&url, &payload).await?;
        }

        self.connection.commit(tx).await?;

        tracing::info!(
            user = %user.uuid,
            username = %user.username,
            reset_token = token.is_some(),
            "user created"
        );
        metrics::counter!("accounts_created_total").increment(1);

        self.notifier.account_created(&user, token.as_deref()).await?;

        Ok(user)
    }

    /// Destination of approval webhooks, when they are enabled.
    async fn webhook_url(&self) -> Result<Option<String>> {
        let enabled = self.settings.get(APPROVALS_WEBHOOK).await?;
        if enabled.as_deref() != Some("true") {
            return Ok(None);
        }

        Ok(self
            .settings
            .get(APPROVALS_WEBHOOK_URL)
            .await?
            .filter(|url| !url.is_empty()))
    }
}
