use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONTENT_TYPE_HEADER: (&str, &str) =
    ("Content-Type", "application/x-www-form-urlencoded");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notifier is not configured")]
    NotConfigured,
    #[error("notification request failed: {0}")]
    Transport(String),
    #[error("notification request returned HTTP {0}")]
    HttpStatus(u16),
}

/// IFTTT Maker webhook used to push the "window is open" message to a phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub event: String,
    pub key: String,
    pub base_url: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            event: "ConservatoryWindowOpen".to_string(),
            key: String::new(),
            base_url: "http://maker.ifttt.com".to_string(),
        }
    }
}

impl NotifierConfig {
    pub fn is_configured(&self) -> bool {
        !self.event.trim().is_empty() && !self.key.trim().is_empty()
    }

    /// The temperature travels as `value1` so the applet can put it in the message.
    pub fn request_url(&self, temperature: i32) -> Result<String, NotifyError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured);
        }

        Ok(format!(
            "{}/trigger/{}/with/key/{}?value1={temperature}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(self.event.trim()),
            urlencoding::encode(self.key.trim()),
        ))
    }
}

/// Only a plain 200 counts as delivered.
pub fn check_status(status: u16) -> Result<(), NotifyError> {
    if status == 200 {
        Ok(())
    } else {
        Err(NotifyError::HttpStatus(status))
    }
}
