//! Persisted kiosk settings.
//!
//! Settings live as pretty-printed JSON in the user's config directory.
//! Command-line flags override them for a single run; `config --save` writes
//! the effective values back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000/";

/// How long a notification stays on screen.
pub const DEFAULT_NOTIFICATION_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the attendance server, endpoints are joined onto it
    pub server_url: String,
    /// Roll number sent along with capture requests, if any
    pub roll_number: Option<String>,
    /// Delay before a notification hides itself
    pub notification_ms: u64,
    /// Upper bound for a whole request, unbounded when unset
    pub request_timeout_secs: Option<u64>,
    /// Upper bound for establishing the connection
    pub connect_timeout_secs: u64,
    /// Report a non-2xx shutdown response as a failure
    pub strict_shutdown: bool,
    /// Refuse to start an action while the same action is still pending
    pub single_flight: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            roll_number: None,
            notification_ms: DEFAULT_NOTIFICATION_MS,
            request_timeout_secs: None,
            connect_timeout_secs: 10,
            strict_shutdown: true,
            single_flight: false,
        }
    }
}

impl Settings {
    pub fn notification_delay(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reads settings from `path`, falling back to defaults when the file does not exist yet.
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(SettingsError::Io(e)),
        };

        Ok(serde_json::from_slice(&content)?)
    }

    /// Persists the settings atomically.
    ///
    /// The JSON is written to a temp file unique to this process and save,
    /// then renamed over the real file, so a crash mid-write never leaves a
    /// truncated settings file behind.
    pub async fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let unique_id = SAVE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let temp_path = path.with_extension(format!("json.{}.{}.tmp", pid, unique_id));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&temp_path, &json).await?;

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "saved settings");
        Ok(())
    }
}

static SAVE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file could not be accessed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default location of the settings file, `None` if the platform has no config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(get_settings_path)
}

pub fn get_settings_path(config_dir: PathBuf) -> PathBuf {
    config_dir.join("attendance-kiosk").join("settings.json")
}
