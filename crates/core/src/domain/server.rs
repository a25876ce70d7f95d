// Server Catalog Entry

use serde::{Deserialize, Serialize};

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Connection parameters for one alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, alias = "keyPath", skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// How a session authenticates, key taking precedence over password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod<'a> {
    Key(&'a str),
    Password(&'a str),
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            key_path: None,
            password: None,
        }
    }

    pub fn with_key(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `None` when neither a key path nor a password is configured
    pub fn auth_method(&self) -> Option<AuthMethod<'_>> {
        match (&self.key_path, &self.password) {
            (Some(key), _) if !key.is_empty() => Some(AuthMethod::Key(key)),
            (_, Some(pw)) if !pw.is_empty() => Some(AuthMethod::Password(pw)),
            _ => None,
        }
    }

    /// Same entry with the password hidden, for listings
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}
