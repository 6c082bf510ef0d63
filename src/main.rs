use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use attendance_kiosk::config::default_settings_path;
use attendance_kiosk::kiosk::Kiosk;
use attendance_kiosk::render::{format_banner, render_status};
use attendance_kiosk::{ActionTriggers, AttendanceClient, NotificationKind, Notifier, Settings, UploadForm, Uploader};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, OptionExt, WrapErr};
use futures::FutureExt;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Base URL of the attendance server, overrides the settings file
    #[arg(long, global = true)]
    server: Option<String>,

    /// Path to the settings file, per default <config dir>/attendance-kiosk/settings.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Roll number to send with capture requests
    #[arg(long, global = true)]
    roll_number: Option<String>,

    /// How verbose the output should be, can be set up to 3 times. Has no effect if RUST_LOG is set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to output log to
    #[arg(short, long, global = true)]
    log_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Interactive kiosk session, the default when no command is given
    Kiosk {
        /// Ignore a button while its previous request is still pending
        #[arg(long)]
        single_flight: bool,
    },
    /// Enroll a face image under a name or roll number
    Upload {
        file: PathBuf,

        /// Name or roll number the image belongs to
        #[arg(short = 'n', long)]
        label: String,
    },
    /// Capture a face and mark attendance
    Capture,
    /// Shut the server's camera down
    Shutdown {
        /// Report success for any answer, whatever its status
        #[arg(long)]
        lenient: bool,
    },
    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let old_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        old_hook(panic_info);
        error!("Backtrace: {:#?}", backtrace);
    }));

    let args = Args::parse();
    tracing_init(&args)?;

    debug!(?args);

    // AssertUnwindSafe is fine, all that happens after a panic is writing the crash log
    match AssertUnwindSafe(run(args)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            error!("the application panicked, this is a bug");
            match write_crashlog(payload.as_ref()) {
                Ok(()) => info!("wrote crashlog to crashlog.txt"),
                Err(e) => error!(%e, "failed to write crashlog"),
            }
            Err(eyre!("the application panicked"))
        }
    }
}

async fn run(args: Args) -> color_eyre::Result<ExitCode> {
    let settings_path = args.config.clone().or_else(default_settings_path);
    let mut settings = match &settings_path {
        Some(path) => Settings::load(path)
            .await
            .wrap_err_with(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(roll_number) = args.roll_number {
        settings.roll_number = Some(roll_number);
    }

    let command = args.command.unwrap_or(Command::Kiosk { single_flight: false });
    match &command {
        Command::Kiosk { single_flight: true } => settings.single_flight = true,
        Command::Shutdown { lenient: true } => settings.strict_shutdown = false,
        _ => {}
    }

    match command {
        Command::Config { save } => show_config(&settings, settings_path, save).await,
        Command::Kiosk { .. } => {
            let session = Session::connect(&settings)?;
            tokio::spawn(render_status(session.notifier.subscribe(), io::stdout()));

            let kiosk = Kiosk::new(session.uploader, session.triggers, session.notifier, settings.single_flight);
            kiosk.run(tokio::io::BufReader::new(tokio::io::stdin())).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Upload { file, label } => {
            let session = Session::connect(&settings)?;
            let shown = session.uploader.upload_file(&UploadForm::new(Some(file), label)).await;
            Ok(session.report(shown))
        }
        Command::Capture => {
            let session = Session::connect(&settings)?;
            let shown = session.triggers.capture().await;
            Ok(session.report(shown))
        }
        Command::Shutdown { .. } => {
            let session = Session::connect(&settings)?;
            let shown = session.triggers.shutdown().await;
            Ok(session.report(shown))
        }
    }
}

async fn show_config(settings: &Settings, path: Option<PathBuf>, save: bool) -> color_eyre::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(settings)?);

    if save {
        let path = path.ok_or_eyre("no settings location available, pass --config")?;
        settings.save(&path).await?;
        info!("saved settings to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}

/// Everything the actions share: one client, one status region.
struct Session {
    notifier: Notifier,
    uploader: Uploader,
    triggers: ActionTriggers,
}

impl Session {
    fn connect(settings: &Settings) -> color_eyre::Result<Self> {
        let client = Arc::new(AttendanceClient::new(settings)?);
        info!(server = %client.base_url(), "using attendance server");

        let notifier = Notifier::new(settings.notification_delay());
        Ok(Self {
            uploader: Uploader::new(client.clone(), notifier.clone()),
            triggers: ActionTriggers::new(client, notifier.clone(), settings),
            notifier,
        })
    }

    /// Prints what a one-shot action left in the status region.
    fn report(&self, shown: NotificationKind) -> ExitCode {
        if let Some(banner) = format_banner(&self.notifier.state()) {
            println!("{banner}");
        }

        match shown {
            NotificationKind::Success => ExitCode::SUCCESS,
            NotificationKind::Error => ExitCode::FAILURE,
        }
    }
}

fn write_crashlog(payload: &(dyn std::any::Any + Send)) -> io::Result<()> {
    let mut file = File::create("crashlog.txt")?;

    match LOG_BUFFER.try_lock() {
        Ok(buffer) => {
            for line in buffer.iter() {
                writeln!(file, "{line}")?;
            }
        }
        Err(_) => writeln!(file, "failed to lock log buffer")?,
    }
    file.write_all(b"\n")?;

    if let Some(s) = payload.downcast_ref::<&str>() {
        file.write_all(s.as_bytes())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        file.write_all(s.as_bytes())
    } else {
        file.write_all(b"panic: unknown payload type")
    }
}

/// Lines kept around for the crash log.
const LOG_BUFFER_LINES: usize = 10_000;

static LOG_BUFFER: LazyLock<Mutex<VecDeque<String>>> = LazyLock::new(|| Mutex::new(VecDeque::new()));

struct VecWriter;

impl io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let str = String::from_utf8_lossy(buf);
        let mut buffer = LOG_BUFFER.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend(str.lines().map(|s| s.to_string()));
        while buffer.len() > LOG_BUFFER_LINES {
            buffer.pop_front();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct DualWriter<A: io::Write, B: io::Write> {
    m: Arc<Mutex<(A, B)>>,
}

impl<A: io::Write, B: io::Write> DualWriter<A, B> {
    fn new(a: A, b: B) -> Self {
        Self {
            m: Arc::new(Mutex::new((a, b))),
        }
    }
}

impl<A: io::Write, B: io::Write> io::Write for DualWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut m = self.m.lock().unwrap_or_else(PoisonError::into_inner);
        m.0.write_all(buf)?;
        m.1.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut m = self.m.lock().unwrap_or_else(PoisonError::into_inner);
        m.0.flush()?;
        m.1.flush()
    }
}

impl<'a, A: io::Write, B: io::Write> MakeWriter<'a> for DualWriter<A, B> {
    type Writer = DualWriter<A, B>;

    fn make_writer(&'a self) -> Self::Writer {
        DualWriter { m: self.m.clone() }
    }
}

// Logs go to stderr, stdout belongs to the status region
fn tracing_init(args: &Args) -> color_eyre::Result<()> {
    tracing_log::LogTracer::init()?;

    let directive = match args.verbose {
        0 => "attendance_kiosk=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive.parse()?)
        .from_env_lossy();

    let console_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(DualWriter::new(VecWriter, io::stderr()))
        .with_filter(env_filter);

    let file_log = if let Some(log_path) = &args.log_path {
        let log_file = File::create(log_path)
            .wrap_err_with(|| format!("failed to create log file {}", log_path.display()))?;
        let file_log = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Mutex::new(log_file))
            .with_filter(tracing::level_filters::LevelFilter::TRACE);
        Some(file_log)
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry().with(console_log).with(file_log);
    tracing::subscriber::set_global_default(subscriber).wrap_err("unable to set up logging")?;

    Ok(())
}
