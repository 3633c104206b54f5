// Tracing log adapter - User notifications rendered as structured log events

use std::sync::{Mutex, PoisonError};

use tracing::{error, warn};

use crate::ports::{Notification, NotifyPort};

/// Notification sink that writes every notification to the tracing subscriber
///
/// Delivered notifications are also kept so a front end can summarise them.
#[derive(Default)]
pub struct TracingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered so far, oldest first
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotifyPort for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::EngineLoadFailed { detail } => {
                error!(kind = "engine_load_failed", %detail, "{}", notification);
            }
            Notification::InvalidFileType { file_name } => {
                warn!(kind = "invalid_file_type", file_name = %file_name, "{}", notification);
            }
            Notification::MetadataReadFailed { file_name } => {
                warn!(kind = "metadata_read_failed", file_name = %file_name, "{}", notification);
            }
            Notification::NoFilesSelected => {
                warn!(kind = "no_files_selected", "{}", notification);
            }
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
