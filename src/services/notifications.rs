use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::config::Settings;

/// Payload sent to the teacher channel after a submission commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SubmissionEvent {
    pub(crate) teacher_id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) attempt_id: String,
    pub(crate) mode: &'static str,
}

#[derive(Debug, Error)]
pub(crate) enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook responded with status {0}")]
    Status(u16),
}

#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn notify_submission(&self, event: &SubmissionEvent) -> Result<(), NotifyError>;
}

pub(crate) struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub(crate) fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_submission(&self, event: &SubmissionEvent) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

pub(crate) struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_submission(&self, event: &SubmissionEvent) -> Result<(), NotifyError> {
        tracing::debug!(
            exam_id = %event.exam_id,
            student_id = %event.student_id,
            "No notification channel configured"
        );
        Ok(())
    }
}

pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    let notifications = settings.notifications();
    match &notifications.webhook_url {
        Some(url) => {
            let timeout = Duration::from_secs(notifications.timeout_seconds);
            let notifier = WebhookNotifier::new(url.clone(), timeout)?;
            tracing::info!(timeout_seconds = notifications.timeout_seconds, "Submission webhook enabled");
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(NoopNotifier)),
    }
}

/// Fire-and-forget delivery. Failures never reach the student.
pub(crate) fn dispatch(notifier: Arc<dyn Notifier>, event: SubmissionEvent) {
    tokio::spawn(async move {
        match notifier.notify_submission(&event).await {
            Ok(()) => {
                tracing::debug!(exam_id = %event.exam_id, attempt_id = %event.attempt_id, "Submission notification sent");
            }
            Err(err) => {
                metrics::counter!("exam_notifications_failed_total").increment(1);
                tracing::warn!(
                    error = %err,
                    exam_id = %event.exam_id,
                    teacher_id = %event.teacher_id,
                    attempt_id = %event.attempt_id,
                    "Failed to deliver submission notification"
                );
            }
        }
    });
}
