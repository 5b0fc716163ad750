//! Connection settings for a FileMaker Web Publishing Engine.
//!
//! A `ClientConfig` can be built in code, deserialized from JSON, or read
//! from `FMXML_*` environment variables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FmError, Result};

/// Fixed path of the FMPXMLRESULT grammar on the publishing engine.
pub const XML_PATH: &str = "/fmi/xml/FMPXMLRESULT.xml";

pub const DEFAULT_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = FmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(FmError::Config(format!("unsupported scheme {other:?}"))),
        }
    }
}

/// Basic-auth account used for every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

// Keep passwords out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ClientConfig {
    pub fn new(host: &str, port: u16, scheme: Scheme) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            port,
            scheme,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Parse a config from a JSON document such as
    /// `{"host": "fm.example.com", "port": 443, "scheme": "https"}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FmError::Config(e.to_string()))
    }

    /// Read `FMXML_HOST` (required), `FMXML_PORT`, `FMXML_SCHEME`,
    /// `FMXML_USER` and `FMXML_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("FMXML_HOST")
            .ok_or_else(|| FmError::Config("FMXML_HOST is not set".to_string()))?;
        let port = match lookup("FMXML_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| FmError::Config(format!("FMXML_PORT {raw:?}: {e}")))?,
            None => DEFAULT_PORT,
        };
        let scheme = match lookup("FMXML_SCHEME") {
            Some(raw) => raw.parse()?,
            None => Scheme::Http,
        };
        let mut config = Self::new(&host, port, scheme);
        if let Some(username) = lookup("FMXML_USER") {
            let password = lookup("FMXML_PASSWORD").unwrap_or_default();
            config = config.with_credentials(&username, &password);
        }
        Ok(config)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Full URL of the FMPXMLRESULT endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{XML_PATH}", self.base_url())
    }
}
