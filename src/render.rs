//! Terminal rendering of the status region.
//!
//! The region is line-oriented: every change appends one line, the banner
//! when a notification shows and [`CLEARED_LINE`] when it hides.

use std::io::{self, Write};

use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{trace, warn};

use crate::notifier::{NotificationKind, NotificationState};

pub const CLEARED_LINE: &str = "[cleared]";

/// Banner line for a visible notification, `None` once it is hidden.
pub fn format_banner(state: &NotificationState) -> Option<String> {
    if !state.visible {
        return None;
    }

    let tag = match state.kind {
        NotificationKind::Success => "ok",
        NotificationKind::Error => "error",
    };

    Some(match state.shown_at {
        Some(at) => format!("[{}] [{tag}] {}", at.format("%H:%M:%S"), state.message),
        None => format!("[{tag}] {}", state.message),
    })
}

/// Follows the notifier and writes each new banner to `out` until the notifier goes away.
pub async fn render_status<W: Write>(rx: watch::Receiver<NotificationState>, mut out: W) {
    let mut updates = WatchStream::from_changes(rx);

    while let Some(state) = updates.next().await {
        let line = match format_banner(&state) {
            Some(line) => line,
            None => {
                trace!(id = state.id, "status region cleared");
                CLEARED_LINE.to_string()
            }
        };

        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                break;
            }
            warn!(%e, "failed to render notification");
        }
    }
}
