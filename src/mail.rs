//! Send emails to user for important updates.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use serde::Serialize;
use url::Url;

use crate::config::{Mail, append_path};
use crate::crypto::random_string;
use crate::error::{Result, ServerError};
use crate::user::User;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

/// Port for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell `user` its account exists, with a setup link if `token` is set.
    async fn account_created(
        &self,
        user: &User,
        token: Option<&str>,
    ) -> Result<()>;
}

/// Mail templates list.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Account provisioned by an administrator.
    AccountCreated,
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
struct Content<'a> {
    locale: &'a str,
    to: &'a str,
    template: Template,
    username: &'a str,
    name: Option<&'a str>,
    app_name: &'a str,
    action_url: Option<String>,
}

/// RabbitMQ mail queue manager.
#[derive(Debug, Clone)]
pub struct MailManager {
    queue: String,
    app_name: String,
    app_url: Url,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Create a [`MailManager`] which only logs notifications.
    pub fn disabled(app_name: &str, app_url: Url) -> Self {
        Self {
            queue: String::default(),
            app_name: app_name.to_owned(),
            app_url,
            conn: None,
        }
    }

    /// Create a new [`MailManager`].
    pub async fn new(
        config: &Mail,
        app_name: &str,
        app_url: Url,
    ) -> Result<Self> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme())
                .map_err(|_| ServerError::InvalidScheme)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let recovery_config =
            RecoveryConfig::default().auto_recover_connection();
        let conn_config = ConnectionProperties::default()
            .with_connection_name("accounts_mail_client".into())
            .with_experimental_recovery_config(recovery_config);
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            app_name: app_name.to_owned(),
            app_url,
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.jexactyl.email",
            source: "com.jexactyl.accounts",
            id: random_string(ID_LENGTH),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }

    /// Link letting the user choose a first password.
    fn setup_url(&self, token: &str, email: &str) -> Result<Url> {
        let segments = ["auth", "password", "reset", token];
        let mut url = append_path(&self.app_url, &segments)?;
        url.query_pairs_mut().append_pair("email", email);
        Ok(url)
    }

    fn account_created_content<'a>(
        &'a self,
        user: &'a User,
        token: Option<&str>,
    ) -> Result<Content<'a>> {
        Ok(Content {
            locale: &user.language,
            to: &user.email,
            template: Template::AccountCreated,
            username: &user.username,
            name: user.name_first.as_deref(),
            app_name: &self.app_name,
            action_url: token
                .map(|token| self.setup_url(token, &user.email))
                .transpose()?
                .map(String::from),
        })
    }
}

#[async_trait]
impl Notifier for MailManager {
    async fn account_created(
        &self,
        user: &User,
        token: Option<&str>,
    ) -> Result<()> {
        let content = self.account_created_content(user, token)?;

        let Some(conn) = &self.conn else {
            tracing::debug!(
                template = ?content.template,
                "mail queue disabled, event skipped"
            );
            return Ok(());
        };
        let channel =
            Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let payload = serde_json::to_vec(&Self::create_event(content))?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        tracing::trace!(user = %user.uuid, "account created event sent");

        Ok(())
    }
}
