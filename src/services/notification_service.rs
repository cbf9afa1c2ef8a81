use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::constants::NOTICE_CHANNEL_CAPACITY;

const RECENT_NOTICE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Short user-facing message, the toast of the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fans user notices out to WebSocket clients and keeps a short history.
#[derive(Clone)]
pub struct NotificationService {
    sender: broadcast::Sender<Notice>,
    recent: Arc<Mutex<Vec<Notice>>>,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationService {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            sender,
            recent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn send(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            created_at: Utc::now(),
        };

        match level {
            NoticeLevel::Success => tracing::info!("Notice: {}", notice.message),
            NoticeLevel::Error => tracing::warn!("Notice: {}", notice.message),
        }

        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            recent.push(notice.clone());
            if recent.len() > RECENT_NOTICE_LIMIT {
                let overflow = recent.len() - RECENT_NOTICE_LIMIT;
                recent.drain(..overflow);
            }
        }

        // No connected clients is not an error.
        let _ = self.sender.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Error, message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Most recent notices, oldest first.
    pub fn recent(&self) -> Vec<Notice> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
