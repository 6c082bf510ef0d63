//! Interactive kiosk session.
//!
//! The operator types commands on stdin. The file selection and label form
//! the upload form; `upload`, `capture` and `shutdown` play the role of the
//! buttons. Actions run as tasks on the same runtime, so the prompt stays
//! responsive while a request is pending, and results show up in the status
//! region whenever they complete.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::actions::ActionTriggers;
use crate::notifier::Notifier;
use crate::render::format_banner;
use crate::upload::{UploadForm, Uploader};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

const HELP: &str = "\
commands:
  file <path>     select the image to upload
  pick            select the image with a file dialog
  label <text>    set the name or roll number for the upload
  upload          upload the selected image under the label
  capture         capture a face and mark attendance
  shutdown        shut the camera down
  status          show the form and the current notification
  help            show this text
  quit            leave the kiosk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskCommand {
    File(PathBuf),
    Pick,
    Label(String),
    Upload,
    Capture,
    Shutdown,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty input")]
    Empty,
    #[error("unknown command {0:?}, type `help` for a list")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

impl FromStr for KioskCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseCommandError::Empty);
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command.to_ascii_lowercase().as_str() {
            "file" if rest.is_empty() => Err(ParseCommandError::MissingArgument("file")),
            "file" => Ok(KioskCommand::File(PathBuf::from(rest))),
            "pick" => Ok(KioskCommand::Pick),
            "label" | "name" => Ok(KioskCommand::Label(rest.to_string())),
            "upload" => Ok(KioskCommand::Upload),
            "capture" => Ok(KioskCommand::Capture),
            "shutdown" => Ok(KioskCommand::Shutdown),
            "status" => Ok(KioskCommand::Status),
            "help" | "?" => Ok(KioskCommand::Help),
            "quit" | "exit" => Ok(KioskCommand::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Capture,
    Shutdown,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upload => write!(f, "upload"),
            Action::Capture => write!(f, "capture"),
            Action::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Keeps at most one request per action in flight, like a button disabled while pending.
#[derive(Debug, Default, Clone)]
pub struct ActionGate {
    busy: Arc<[AtomicBool; 3]>,
}

impl ActionGate {
    fn slot(&self, action: Action) -> &AtomicBool {
        &self.busy[action as usize]
    }

    pub fn try_begin(&self, action: Action) -> Option<InFlight> {
        self.slot(action)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { gate: self.clone(), action })
    }
}

pub struct InFlight {
    gate: ActionGate,
    action: Action,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gate.slot(self.action).store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Kiosk {
    form: UploadForm,
    uploader: Uploader,
    triggers: ActionTriggers,
    notifier: Notifier,
    gate: Option<ActionGate>,
    tasks: JoinSet<()>,
}

impl Kiosk {
    pub fn new(uploader: Uploader, triggers: ActionTriggers, notifier: Notifier, single_flight: bool) -> Self {
        Self {
            form: UploadForm::default(),
            uploader,
            triggers,
            notifier,
            gate: single_flight.then(ActionGate::default),
            tasks: JoinSet::new(),
        }
    }

    pub fn form(&self) -> &UploadForm {
        &self.form
    }

    /// Reads commands from `input` until it ends, `quit` is entered or ctrl-c is pressed.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> std::io::Result<()> {
        let mut lines = input.lines();
        println!("{HELP}");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => line,
                    None => break,
                },
                Some(finished) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = finished {
                        warn!(%e, "action task ended abnormally");
                    }
                    continue;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break;
                }
            };

            match line.parse::<KioskCommand>() {
                Ok(command) => {
                    if self.handle(command).await == Flow::Quit {
                        break;
                    }
                }
                Err(ParseCommandError::Empty) => {}
                Err(e) => println!("{e}"),
            }
        }

        self.drain().await;
        Ok(())
    }

    pub async fn handle(&mut self, command: KioskCommand) -> Flow {
        debug!(?command, "kiosk command");

        match command {
            KioskCommand::File(path) => {
                println!("selected {}", path.display());
                self.form.file = Some(path);
            }
            KioskCommand::Pick => match pick_image().await {
                Some(path) => {
                    println!("selected {}", path.display());
                    self.form.file = Some(path);
                }
                None => println!("no file selected"),
            },
            KioskCommand::Label(label) => {
                self.form.label = label;
            }
            KioskCommand::Upload => {
                let uploader = self.uploader.clone();
                let form = self.form.clone();
                self.spawn(Action::Upload, async move {
                    uploader.upload_file(&form).await;
                });
            }
            KioskCommand::Capture => {
                let triggers = self.triggers.clone();
                self.spawn(Action::Capture, async move {
                    triggers.capture().await;
                });
            }
            KioskCommand::Shutdown => {
                let triggers = self.triggers.clone();
                self.spawn(Action::Shutdown, async move {
                    triggers.shutdown().await;
                });
            }
            KioskCommand::Status => self.print_status(),
            KioskCommand::Help => println!("{HELP}"),
            KioskCommand::Quit => return Flow::Quit,
        }

        Flow::Continue
    }

    fn spawn<F>(&mut self, action: Action, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let guard = match &self.gate {
            Some(gate) => match gate.try_begin(action) {
                Some(guard) => Some(guard),
                None => {
                    println!("{action} is still pending");
                    return;
                }
            },
            None => None,
        };

        self.tasks.spawn(async move {
            let _guard = guard;
            future.await;
        });
    }

    /// Waits for every action that is still in flight.
    pub async fn drain(&mut self) {
        while let Some(finished) = self.tasks.join_next().await {
            if let Err(e) = finished {
                warn!(%e, "action task ended abnormally");
            }
        }
    }

    fn print_status(&self) {
        let file = self
            .form
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string());
        let label = if self.form.label.is_empty() { "<none>" } else { &self.form.label };

        println!("file:  {file}");
        println!("label: {label}");
        match format_banner(&self.notifier.state()) {
            Some(banner) => println!("shown: {banner}"),
            None => println!("shown: <nothing>"),
        }
    }
}

async fn pick_image() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Select face image")
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}
