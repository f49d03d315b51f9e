use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertSeverity {
    High,
    Critical,
}

/// Operational alert for every configured administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub booking_id: Option<Uuid>,
    pub message: String,
    /// Amounts, references and party names relevant to the incident
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint returned status {0}")]
    Rejected(u16),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admins(&self, alert: AdminAlert) -> Result<(), NotificationError>;

    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError>;

    async fn send_push(&self, message: PushMessage) -> Result<(), NotificationError>;
}

/// Posts notifications as JSON to the configured endpoints. Channels without
/// an endpoint are written to the log instead.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    config: NotificationConfig,
}

impl HttpNotifier {
    pub fn new(config: NotificationConfig, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<(), NotificationError> {
        let response = self.client.post(endpoint).json(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotificationError::Rejected(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, alert), fields(severity = %alert.severity, booking_id = ?alert.booking_id))]
    async fn notify_admins(&self, alert: AdminAlert) -> Result<(), NotificationError> {
        let Some(endpoint) = self.config.admin_alert_endpoint.as_deref() else {
            return LogNotifier.notify_admins(alert).await;
        };

        let body = json!({
            "recipients": self.config.admin_recipients,
            "alert": alert,
        });
        self.post(endpoint, &body).await.map_err(|e| {
            error!(error = %e, "failed to deliver administrator alert");
            e
        })
    }

    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError> {
        match self.config.email_endpoint.as_deref() {
            Some(endpoint) => self.post(endpoint, &json!(message)).await,
            None => LogNotifier.send_email(message).await,
        }
    }

    async fn send_push(&self, message: PushMessage) -> Result<(), NotificationError> {
        match self.config.push_endpoint.as_deref() {
            Some(endpoint) => self.post(endpoint, &json!(message)).await,
            None => LogNotifier.send_push(message).await,
        }
    }
}

/// Writes notifications to the log. Used in development and when no endpoint is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_admins(&self, alert: AdminAlert) -> Result<(), NotificationError> {
        match alert.severity {
            AlertSeverity::Critical => error!(
                severity = "critical",
                booking_id = ?alert.booking_id,
                context = %alert.context,
                "ADMIN ALERT: {}: {}",
                alert.title,
                alert.message
            ),
            AlertSeverity::High => warn!(
                severity = "high",
                booking_id = ?alert.booking_id,
                context = %alert.context,
                "ADMIN ALERT: {}: {}",
                alert.title,
                alert.message
            ),
        }
        Ok(())
    }

    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(to = %message.to, subject = %message.subject, "email queued");
        Ok(())
    }

    async fn send_push(&self, message: PushMessage) -> Result<(), NotificationError> {
        info!(title = %message.title, "push notification queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> AdminAlert {
        AdminAlert {
            severity: AlertSeverity::Critical,
            title: "payment captured but booking not marked complete".into(),
            booking_id: Some(Uuid::nil()),
            message: "manual reconciliation required".into(),
            context: json!({ "amount_captured": 15000 }),
        }
    }

    #[tokio::test]
    async fn admin_alert_is_posted_with_recipients() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(body_partial_json(json!({
                "recipients": ["ops@example.com"],
                "alert": { "severity": "critical" }
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(
            NotificationConfig {
                admin_alert_endpoint: Some(format!("{}/alerts", server.uri())),
                admin_recipients: vec!["ops@example.com".into()],
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        notifier.notify_admins(alert()).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_delivery_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(
            NotificationConfig {
                email_endpoint: Some(server.uri()),
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let result = notifier
            .send_email(EmailMessage {
                to: "customer@example.com".into(),
                subject: "Your service is complete".into(),
                body: "Thanks".into(),
            })
            .await;
        assert!(matches!(result, Err(NotificationError::Rejected(500))));
    }

    #[tokio::test]
    async fn channels_without_endpoint_fall_back_to_log() {
        let notifier =
            HttpNotifier::new(NotificationConfig::default(), Duration::from_secs(5)).unwrap();
        assert!(notifier.notify_admins(alert()).await.is_ok());
    }
}
