use crate::config::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the catalog/feedback data service
#[derive(Error, Debug)]
pub enum DataServiceError {
    #[error("invalid data service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("data service request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("data service timed out after {0:?}")]
    Timeout(Duration),

    #[error("data service answered with status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

/// Failures building or sending a notification email
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("mail delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("could not set up notifications: {0}")]
    Notifier(#[from] NotifyError),
}
