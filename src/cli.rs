//! Command-line surface (spec.md 6). Implemented with `clap`'s derive API,
//! the one crate in this retrieval pack purpose-built for CLI parsing — the
//! GUI teacher has no CLI surface of its own to borrow from, so this is
//! drawn from the pack's CLI-shaped sibling (`jim60105-subx-cli`) instead.

use std::path::PathBuf;

use clap::Parser;

/// Transcode media files for storage, resuming interrupted batches.
#[derive(Debug, Parser)]
#[command(name = "recodex", version, about, author)]
pub struct Cli {
    /// Source items to compress.
    #[arg(value_name = "SRC_PATH_LIST")]
    pub source: Vec<PathBuf>,

    /// Path to target directory for this type of content.
    #[arg(long, default_value = "")]
    pub dest: String,

    /// Resume unfinished recoding instead of ingesting new sources.
    #[arg(long)]
    pub resume: bool,

    /// Path to the file where scheduler state is stored.
    #[arg(long, default_value = "")]
    pub state: String,

    /// Path to append logs to.
    #[arg(long, default_value = "")]
    pub log: String,

    /// Do not start encoding, just create the state file for resuming later.
    #[arg(long)]
    pub nostart: bool,

    /// Produce additional debug output.
    #[arg(long)]
    pub debug: bool,

    /// Only generate shell scripts for encoding, do no real encoding work.
    #[arg(long)]
    pub scriptize: bool,

    /// Be interactive: ask some questions before running.
    #[arg(long, short = 'i')]
    pub interactive: bool,

    /// Force a media type instead of auto-detecting from the filename.
    #[arg(long = "force-type", value_name = "TYPE")]
    pub force_type: Option<String>,

    /// Additional `key=value:key=value` parameters for the forced media type.
    #[arg(long = "force-params", default_value = "")]
    pub force_params: String,

    /// Show parameters accepted by each media type and exit.
    #[arg(long = "list-params")]
    pub list_params: bool,
}

impl Cli {
    /// The resolved state-file path: `--state` if given, else
    /// `<dest>/tasks.json` (spec.md 6 default `<dest>/tasks.pickle`, reworked
    /// for this crate's JSON encoding per SPEC_FULL.md 3).
    pub fn resolve_state_path(&self) -> Option<PathBuf> {
        if !self.state.is_empty() {
            return Some(PathBuf::from(&self.state));
        }
        if !self.dest.is_empty() {
            return Some(PathBuf::from(&self.dest).join("tasks.json"));
        }
        None
    }

    /// The resolved log-file path: `--log` if given, else `<dest>/recode.log`.
    pub fn resolve_log_path(&self) -> Option<PathBuf> {
        if !self.log.is_empty() {
            return Some(PathBuf::from(&self.log));
        }
        if !self.dest.is_empty() {
            return Some(PathBuf::from(&self.dest).join("recode.log"));
        }
        None
    }
}
