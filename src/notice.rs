//! User-facing notices ("toasts") raised by workflows and flows.
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Where notices end up: a terminal, a UI toast queue, a test recorder.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => info!(text = %notice.text, "notice"),
            NoticeLevel::Warning => warn!(text = %notice.text, "notice"),
            NoticeLevel::Error => error!(text = %notice.text, "notice"),
        }
    }
}

/// Keeps every notice in arrival order so a front-end can drain and render them.
#[derive(Debug, Default, Clone)]
pub struct NoticeQueue {
    inner: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notice> {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *guard)
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.snapshot().iter().filter(|n| n.level == level).count()
    }
}

impl Notifier for NoticeQueue {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keeps_order_and_drains() {
        let q = NoticeQueue::new();
        q.notify(Notice::success("saved"));
        q.notify(Notice::error("failed"));
        assert_eq!(q.count(NoticeLevel::Error), 1);
        let drained = q.drain();
        assert_eq!(drained, vec![Notice::success("saved"), Notice::error("failed")]);
        assert!(q.snapshot().is_empty());
    }
}
