// WorkHole/backend-api/src/notify.rs
//! Fire-and-forget fan-out of in-app notifications and templated mail.
//! Delivery happens on a spawned task; failures are logged and dropped so
//! they can never fail the operation that triggered them.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Attendance,
    Break,
    Timer,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub employee_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(
        employee_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Notification {
            employee_id,
            kind,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MailEvent {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakWarning,
    BreakExceeded,
    BreakEnd,
    TimerStart,
    TimerComplete,
    LeaveSubmitted,
    LeaveDecided,
}

impl MailEvent {
    pub fn template(&self) -> &'static str {
        match self {
            MailEvent::ClockIn => "clock-in",
            MailEvent::ClockOut => "clock-out",
            MailEvent::BreakStart => "break-start",
            MailEvent::BreakWarning => "break-warning",
            MailEvent::BreakExceeded => "break-exceed",
            MailEvent::BreakEnd => "break-end",
            MailEvent::TimerStart => "timer-start",
            MailEvent::TimerComplete => "timer-complete",
            MailEvent::LeaveSubmitted => "leave-submitted",
            MailEvent::LeaveDecided => "leave-decided",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            MailEvent::ClockIn => "Clock-in confirmed",
            MailEvent::ClockOut => "Clock-out confirmed",
            MailEvent::BreakStart => "Your break has started",
            MailEvent::BreakWarning => "Your break ends in one minute",
            MailEvent::BreakExceeded => "Your break time is over",
            MailEvent::BreakEnd => "Welcome back from your break",
            MailEvent::TimerStart => "Focus session started",
            MailEvent::TimerComplete => "Focus session completed",
            MailEvent::LeaveSubmitted => "Leave request submitted",
            MailEvent::LeaveDecided => "Your leave request was reviewed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mail {
    pub to: String,
    pub event: MailEvent,
    /// Template variables.
    pub context: Value,
}

impl Mail {
    pub fn new(to: impl Into<String>, event: MailEvent, context: Value) -> Self {
        Mail {
            to: to.into(),
            event,
            context,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), NotifyError>;
}

/// Writes every delivery to the application log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        log::info!(
            "[notification:{:?}] to {}: {} - {}",
            notification.kind,
            notification.employee_id,
            notification.title,
            notification.message
        );
        Ok(())
    }
}

#[async_trait]
impl MailSink for LogSink {
    async fn send(&self, mail: &Mail) -> Result<(), NotifyError> {
        log::info!(
            "[mail:{}] to {}: \"{}\" {}",
            mail.event.template(),
            mail.to,
            mail.event.subject(),
            mail.context
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    notifications: Arc<dyn NotificationSink>,
    mail: Arc<dyn MailSink>,
}

impl Notifier {
    pub fn new(notifications: Arc<dyn NotificationSink>, mail: Arc<dyn MailSink>) -> Self {
        Notifier {
            notifications,
            mail,
        }
    }

    pub fn logging() -> Self {
        Notifier::new(Arc::new(LogSink), Arc::new(LogSink))
    }

    /// Returns immediately; the handle is only awaited by tests.
    pub fn dispatch(&self, notification: Notification, mail: Option<Mail>) -> JoinHandle<()> {
        let notifications = Arc::clone(&self.notifications);
        let mailer = Arc::clone(&self.mail);
        tokio::spawn(async move {
            if let Err(e) = notifications.notify(&notification).await {
                log::warn!(
                    "Notification '{}' for {} was not delivered: {}",
                    notification.title,
                    notification.employee_id,
                    e
                );
            }
            if let Some(mail) = mail {
                if let Err(e) = mailer.send(&mail).await {
                    log::warn!(
                        "Mail '{}' to {} was not sent: {}",
                        mail.event.template(),
                        mail.to,
                        e
                    );
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub notifications: Mutex<Vec<Notification>>,
        pub mails: Mutex<Vec<Mail>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl MailSink for RecordingSink {
        async fn send(&self, mail: &Mail) -> Result<(), NotifyError> {
            self.mails.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    pub struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("push service unavailable".into()))
        }
    }

    #[async_trait]
    impl MailSink for FailingSink {
        async fn send(&self, _: &Mail) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp timeout".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingSink, RecordingSink};
    use super::*;
    use serde_json::json;

    fn clock_in_notification() -> Notification {
        Notification::new(Uuid::nil(), NotificationKind::Attendance, "Clocked in", "Clocked in at 09:00")
    }

    #[tokio::test]
    async fn delivers_to_both_sinks() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(sink.clone(), sink.clone());
        let mail = Mail::new("mona@example.com", MailEvent::ClockIn, json!({"time": "09:00"}));

        notifier
            .dispatch(clock_in_notification(), Some(mail.clone()))
            .await
            .unwrap();

        assert_eq!(sink.notifications.lock().unwrap().as_slice(), &[clock_in_notification()]);
        assert_eq!(sink.mails.lock().unwrap().as_slice(), &[mail]);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSink), Arc::new(FailingSink));
        let mail = Mail::new("mona@example.com", MailEvent::BreakExceeded, json!({}));
        // The spawned task finishes normally even though both sinks fail.
        assert!(notifier.dispatch(clock_in_notification(), Some(mail)).await.is_ok());
    }

    #[tokio::test]
    async fn mail_is_sent_even_when_notification_fails() {
        let recorder = Arc::new(RecordingSink::default());
        let notifier = Notifier::new(Arc::new(FailingSink), recorder.clone());
        let mail = Mail::new("mona@example.com", MailEvent::TimerComplete, json!({}));
        notifier.dispatch(clock_in_notification(), Some(mail)).await.unwrap();
        assert_eq!(recorder.mails.lock().unwrap().len(), 1);
    }

    #[test]
    fn templates_match_event_names() {
        assert_eq!(MailEvent::BreakExceeded.template(), "break-exceed");
        assert_eq!(MailEvent::ClockOut.template(), "clock-out");
        assert_eq!(MailEvent::TimerStart.subject(), "Focus session started");
    }
}
