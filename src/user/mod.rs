mod password;
mod repository;
mod service;

pub use password::*;
pub use repository::*;
pub use service::*;

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const DEFAULT_LANGUAGE: &str = "en";

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([\w.-]*[a-z0-9])?$")
        .expect("username pattern is valid")
});

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub external_id: Option<String>,
    pub username: String,
    pub email: String,
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    #[serde(skip)]
    pub password: String,
    pub language: String,
    pub root_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Account data submitted by an administrator.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name_first: Option<String>,
    #[serde(default)]
    pub name_last: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub root_admin: bool,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("name_first", &self.name_first)
            .field("name_last", &self.name_last)
            .field("external_id", &self.external_id)
            .field("language", &self.language)
            .field("root_admin", &self.root_admin)
            .finish()
    }
}

/// Row ready to be inserted, password already hashed.
#[derive(Clone, Debug, PartialEq, Validate)]
pub struct NewUser {
    pub uuid: Uuid,
    #[validate(length(
        min = 1,
        max = 191,
        message = "External ID must be 1 to 191 characters long."
    ))]
    pub external_id: Option<String>,
    #[validate(
        length(
            min = 1,
            max = 191,
            message = "Username must be 1 to 191 characters long."
        ),
        custom(
            function = "validate_username",
            message = "Username must start and end with alpha-numeric characters and contain only letters, numbers, dashes, underscores and periods."
        )
    )]
    pub username: String,
    #[validate(
        email(message = "Email must be formatted."),
        length(max = 191, message = "Email must be at most 191 characters.")
    )]
    pub email: String,
    #[validate(length(
        min = 1,
        max = 191,
        message = "First name must be 1 to 191 characters long."
    ))]
    pub name_first: Option<String>,
    #[validate(length(
        min = 1,
        max = 191,
        message = "Last name must be 1 to 191 characters long."
    ))]
    pub name_last: Option<String>,
    pub password: String,
    #[validate(length(
        equal = 2,
        message = "Language must be ISO 639-1 alpha-2."
    ))]
    pub language: String,
    pub root_admin: bool,
}

impl NewUser {
    /// Build a row from submitted data, a hashed password and a fresh UUID.
    pub fn from_data(data: UserData, uuid: Uuid, password: String) -> Self {
        Self {
            uuid,
            external_id: data.external_id,
            username: data.username.to_lowercase(),
            email: data.email,
            name_first: data.name_first,
            name_last: data.name_last,
            password,
            language: data
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
            root_admin: data.root_admin,
        }
    }
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> UserData {
        UserData {
            username: "Ghost.Rider".into(),
            email: "ghost@nebula.gg".into(),
            password: Some("hunter22".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_data() {
        let uuid = Uuid::new_v4();
        let user = NewUser::from_data(data(), uuid, "$argon2id$...".into());

        assert_eq!(user.uuid, uuid);
        assert_eq!(user.username, "ghost.rider");
        assert_eq!(user.language, DEFAULT_LANGUAGE);
        assert_eq!(user.password, "$argon2id$...");
        assert!(user.validate().is_ok());
    }

    #[test]
    fn test_invalid_fields() {
        let mut data = data();
        data.username = "-nope".into();
        data.email = "not an email".into();
        data.language = Some("english".into());
        let user = NewUser::from_data(data, Uuid::new_v4(), String::new());

        let errors = user.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("language"));
        assert!(!fields.contains_key("name_first"));
    }

    #[test]
    fn test_short_usernames() {
        for username in ["a", "Z9"] {
            let mut data = data();
            data.username = username.into();
            let user = NewUser::from_data(data, Uuid::new_v4(), String::new());

            assert!(user.validate().is_ok(), "{username} rejected");
        }
    }

    #[test]
    fn test_username_pattern() {
        assert!(validate_username("a").is_ok());
        assert!(validate_username("ab").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("a_b-c.d9").is_ok());
        assert!(validate_username("-").is_err());
        assert!(validate_username("_a").is_err());
        assert!(validate_username("abc_").is_err());
        assert!(validate_username("ab c").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let output = format!("{:?}", data());
        assert!(!output.contains("hunter22"));
        assert!(output.contains("[redacted]"));
    }
}
