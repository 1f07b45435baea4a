//! Notification delivery to the event manager

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::ZenossConfig;
use crate::models::Notification;

/// Path of the Zenoss event intake endpoint, relative to the base URL
const ADD_EVENT_PATH: &str = "/zport/dmd/ZenEventManager/manage_addEvent";

/// Delivers notifications to an external system
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a single notification
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sends events to the Zenoss event manager over HTTP
pub struct ZenossNotifier {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    event_class: String,
    event_class_key: String,
}

impl ZenossNotifier {
    /// Create a new Zenoss notifier
    pub fn new(config: &ZenossConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("alertbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            event_class: config.event_class.clone(),
            event_class_key: config.event_class_key.clone(),
        })
    }
}

#[async_trait]
impl Notifier for ZenossNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let url = format!("{}{}", self.base_url, ADD_EVENT_PATH);
        let severity = notification.severity.to_string();

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[
                ("device", notification.device.as_str()),
                ("component", notification.component.as_str()),
                ("summary", notification.message.as_str()),
                ("severity", severity.as_str()),
                ("eventClass", self.event_class.as_str()),
                ("eventClassKey", self.event_class_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Zenoss returned {}: {}",
                status, body
            )));
        }

        debug!(
            component = %notification.component,
            severity = notification.severity,
            "Zenoss event sent"
        );
        Ok(())
    }
}

/// Notifier that only logs, used for dry runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            component = %notification.component,
            device = %notification.device,
            severity = notification.severity,
            message = %notification.message,
            "Dry run: notification not delivered"
        );
        Ok(())
    }
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Delivery failed: transport error, timeout or non-success status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The notifier couldn't be built from its configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
