use lettre::message::Mailbox;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_SUBJECT: &str = "Feedback-data from feedback-portal";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Timeout for {0} cannot be 0")]
    ZeroTimeout(&'static str),

    #[error("Notification sender cannot be empty")]
    EmptySender,

    #[error("Notification needs at least one recipient")]
    NoRecipients,

    #[error("Invalid mail address: {0}")]
    InvalidAddress(String),

    #[error("SMTP username and password must be set together")]
    IncompleteCredentials,
}

/// Feedback portal configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the feedback form
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Take the requester address from the first `X-Forwarded-For` entry.
    /// Only enable this behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    pub data_service: DataServiceConfig,
    pub smtp: SmtpConfig,
    pub notification: NotificationConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.data_service.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("data_service"));
        }

        self.smtp.validate()?;
        self.notification.validate()?;

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Catalog and feedback store
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DataServiceConfig {
    /// Base URL; `/labs`, `/experiments` and `/feedback` are resolved below it
    pub url: Url,
    /// Bound on every call, including reading the response body
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465
    #[default]
    Tls,
    StartTls,
    /// Plaintext. Only for local relays.
    None,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    /// Defaults to the well-known port for `security`
    pub port: Option<u16>,
    #[serde(default)]
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.security {
            SmtpSecurity::Tls => 465,
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::None => 25,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.port == Some(0) {
            return Err(ValidationError::InvalidPort);
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("smtp"));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(ValidationError::IncompleteCredentials);
        }

        Ok(())
    }
}

/// Who gets told about new feedback
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NotificationConfig {
    pub sender: String,
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl NotificationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.sender.trim().is_empty() {
            return Err(ValidationError::EmptySender);
        }

        if self.recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }

        for address in std::iter::once(&self.sender).chain(&self.recipients) {
            if address.parse::<Mailbox>().is_err() {
                return Err(ValidationError::InvalidAddress(address.clone()));
            }
        }

        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}
