//! Capture and shutdown, the two body-less remote actions.

use std::sync::Arc;

use tracing::{error, info};

use crate::client::AttendanceClient;
use crate::config::Settings;
use crate::notifier::{NotificationKind, Notifier};

pub const CAPTURE_ERROR_MESSAGE: &str = "Error capturing image.";
pub const SHUTDOWN_SUCCESS_MESSAGE: &str = "Camera shut down successfully.";
pub const SHUTDOWN_ERROR_MESSAGE: &str = "Error shutting down camera.";

/// A capture answer containing this is a recognition miss, even though the request succeeded.
pub const NO_MATCH_MARKER: &str = "No match";

pub fn classify_capture(message: &str) -> NotificationKind {
    if message.contains(NO_MATCH_MARKER) {
        NotificationKind::Error
    } else {
        NotificationKind::Success
    }
}

#[derive(Clone)]
pub struct ActionTriggers {
    client: Arc<AttendanceClient>,
    notifier: Notifier,
    roll_number: Option<String>,
    strict_shutdown: bool,
}

impl ActionTriggers {
    pub fn new(client: Arc<AttendanceClient>, notifier: Notifier, settings: &Settings) -> Self {
        Self {
            client,
            notifier,
            roll_number: settings.roll_number.clone().filter(|r| !r.trim().is_empty()),
            strict_shutdown: settings.strict_shutdown,
        }
    }

    pub async fn capture(&self) -> NotificationKind {
        match self.client.capture(self.roll_number.as_deref()).await {
            Ok(result) => {
                let kind = classify_capture(&result.message);
                info!(?kind, message = %result.message, "capture answered");
                self.notifier.notify(result.message, kind);
                kind
            }
            Err(e) => {
                error!(error = %e, "capture failed");
                self.notifier.notify(CAPTURE_ERROR_MESSAGE, NotificationKind::Error);
                NotificationKind::Error
            }
        }
    }

    pub async fn shutdown(&self) -> NotificationKind {
        match self.client.shutdown(self.strict_shutdown).await {
            Ok(status) => {
                info!(%status, "shutdown answered");
                self.notifier.notify(SHUTDOWN_SUCCESS_MESSAGE, NotificationKind::Success);
                NotificationKind::Success
            }
            Err(e) => {
                error!(error = %e, "shutdown failed");
                self.notifier.notify(SHUTDOWN_ERROR_MESSAGE, NotificationKind::Error);
                NotificationKind::Error
            }
        }
    }
}
