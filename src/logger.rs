//! Session logger — installs the `tracing` subscriber for the binary.
//!
//! Events go to stderr and to a single log file that is **truncated at each
//! launch**, so it only ever holds the most recent session.
//!
//! Default log location:
//!   Windows:  `%APPDATA%\AIImageEditor\ai-image-editor.log`
//!   Linux:    `~/.local/share/AIImageEditor/ai-image-editor.log`
//!   macOS:    `~/Library/Application Support/AIImageEditor/ai-image-editor.log`
//!
//! Library code only emits `tracing` events and never calls [`init`].

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    /// Debug-level output instead of info.
    pub verbose: bool,
    /// Log file override; `None` uses the platform data directory.
    pub file: Option<PathBuf>,
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the global subscriber and the panic hook. Call once at startup.
///
/// `RUST_LOG` overrides the level chosen by `verbose`. A log file that
/// cannot be opened only disables the file sink.
pub fn init(options: LogOptions) {
    let default_level = if options.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let path = options.file.unwrap_or_else(log_file_path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file_layer = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(file) => {
            let _ = LOG_PATH.set(path.clone());
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        // Someone else owns the global subscriber (e.g. a test harness)
        return;
    }

    if let Some(path) = log_path() {
        tracing::info!(log_file = %path.display(), "session log started");
    }

    // Mirror panics into the log, then run the default handler
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("AIImageEditor").join("ai-image-editor.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
