use crate::database::SlotStore;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NOTIFICATIONS: &str = "notifications";

pub const MAX_PENDING: usize = 5;
pub const MAX_MESSAGE_CHARS: usize = 300;

/// How long a banner stays on screen.
pub const DISMISS_AFTER: Duration = Duration::from_secs(5);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn css_class(&self) -> &'static str {
        match self.level {
            Level::Success => "success-message",
            Level::Error => "error-message",
        }
    }
}

fn clip(message: String) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((end, _)) => format!("{}...", &message[..end]),
        None => message,
    }
}

/// Banners waiting for the next page of this browser. They stack, nothing is merged.
pub struct Notifier<S> {
    slots: S,
}

impl<S: SlotStore> Notifier<S> {
    pub fn new(slots: S) -> Self {
        Notifier { slots }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(Level::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    /// Keeps the newest [`MAX_PENDING`] banners, each cut to [`MAX_MESSAGE_CHARS`].
    fn push(&self, level: Level, message: String) {
        let mut pending = self.pending();
        pending.push(Notification {
            level,
            message: clip(message),
        });
        if pending.len() > MAX_PENDING {
            pending.drain(..pending.len() - MAX_PENDING);
        }
        if let Err(err) = self.slots.write_slot(NOTIFICATIONS, &pending) {
            warn!("Could not queue notification: {}", err);
        }
    }

    fn pending(&self) -> Vec<Notification> {
        self.slots
            .read_slot(NOTIFICATIONS)
            .unwrap_or_else(|err| {
                warn!("Dropping unreadable notifications: {}", err);
                None
            })
            .unwrap_or_default()
    }

    /// Hands out everything queued so far; each banner is shown once.
    pub fn take(&self) -> Vec<Notification> {
        let pending = self.pending();
        if !pending.is_empty() {
            if let Err(err) = self.slots.remove_slot(NOTIFICATIONS) {
                warn!("Could not clear notifications: {}", err);
            }
        }
        pending
    }
}
