//! Structured logging init, the Rust equivalent of the original's
//! `logging.basicConfig` plus its optional `--log <path>` file handler
//! (original_source `main.py`). Built on `env_logger`/`log`, the ambient
//! logging stack this corpus's CLI-shaped sibling (`jim60105-subx-cli`) uses,
//! since the GUI teacher has no logging init of its own to imitate.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Initialises the global logger. `debug` bumps verbosity one level past
/// `info`; `log_path`, when set, tees output to that file instead of
/// stderr (the original always appended, via `logging.FileHandler`).
pub fn init(debug: bool, log_path: Option<&Path>) -> anyhow::Result<()> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.format_timestamp_millis();

    if let Some(path) = log_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|err| anyhow::anyhow!("logger already initialised: {err}"))
}
