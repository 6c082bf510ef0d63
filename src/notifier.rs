//! The status region.
//!
//! There is exactly one [`NotificationState`] at a time. It is owned by the
//! [`Notifier`] and published through a `watch` channel, so any number of
//! renderers can follow it while only the notifier mutates it.
//!
//! Every [`Notifier::notify`] bumps the state's generation and schedules a
//! hide for that generation. A newer notification aborts the pending hide of
//! the older one, and a hide that fires anyway is ignored unless its
//! generation is still the current one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::DEFAULT_NOTIFICATION_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationKind {
    #[default]
    Success,
    Error,
}

impl NotificationKind {
    pub fn is_error(self) -> bool {
        matches!(self, NotificationKind::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationState {
    /// Generation, incremented by every notification
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub visible: bool,
    pub shown_at: Option<DateTime<Local>>,
}

struct Inner {
    state: watch::Sender<NotificationState>,
    pending_hide: Mutex<Option<JoinHandle<()>>>,
    hide_after: Duration,
}

impl Inner {
    fn hide_generation(&self, id: u64) {
        let hidden = self.state.send_if_modified(|state| {
            if state.id == id && state.visible {
                state.visible = false;
                true
            } else {
                false
            }
        });

        if hidden {
            trace!(id, "notification hidden");
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_NOTIFICATION_MS))
    }
}

impl Notifier {
    pub fn new(hide_after: Duration) -> Self {
        let (state, _) = watch::channel(NotificationState::default());

        Self {
            inner: Arc::new(Inner {
                state,
                pending_hide: Mutex::new(None),
                hide_after,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of what the status region currently shows.
    pub fn state(&self) -> NotificationState {
        self.inner.state.borrow().clone()
    }

    pub fn hide_after(&self) -> Duration {
        self.inner.hide_after
    }

    /// Shows `message` with the given styling and schedules it to disappear.
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify(&self, message: impl Into<String>, kind: NotificationKind) {
        let message = message.into();
        debug!(?kind, %message, "notify");

        // generation and pending hide change together, otherwise a racing
        // notify could abort the hide of the newer generation
        let mut pending = self.lock_pending();

        let mut id = 0;
        self.inner.state.send_modify(|state| {
            state.id += 1;
            id = state.id;
            state.message = message;
            state.kind = kind;
            state.visible = true;
            state.shown_at = Some(Local::now());
        });

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let hide_after = self.inner.hide_after;
        let task = tokio::spawn(async move {
            tokio::time::sleep(hide_after).await;
            if let Some(inner) = weak.upgrade() {
                inner.hide_generation(id);
            }
        });

        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    /// Hides the current notification right away.
    pub fn hide(&self) {
        let mut pending = self.lock_pending();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let id = self.inner.state.borrow().id;
        self.inner.hide_generation(id);
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.pending_hide.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
