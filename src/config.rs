//! Layered application configuration: defaults -> JSON file on disk -> CLI
//! overrides applied by the caller. Grounded in the teacher's
//! `transcoding::settings` sidecar-JSON pattern (tmp-file-then-rename writes,
//! `#[serde(default)]` so old config files keep loading after new fields are
//! added).

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Explicit overrides for the external tools the encoder-task adapters
/// shell out to. `None` means "resolve via the matching `*_PATH`
/// environment variable, falling back to a `PATH` search" (spec.md 9, tool
/// resolver).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolOverrides {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffmpeg_normalize_path: Option<PathBuf>,
    pub mkvextract_path: Option<PathBuf>,
    pub mkvmerge_path: Option<PathBuf>,
}

fn default_update_delay_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub tools: ToolOverrides,
    /// Throttle, in seconds, for incremental ingest re-reads (spec.md
    /// 4.4.5). Exposed here mainly so tests and unusually large batches of
    /// ingestion can tighten the default without a recompile.
    #[serde(default = "default_update_delay_secs")]
    pub update_delay_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            tools: ToolOverrides::default(),
            update_delay_secs: default_update_delay_secs(),
        }
    }
}

impl AppSettings {
    /// Loads defaults, then overlays a JSON config file if `path` exists.
    /// A missing file is not an error: defaults stand alone, matching the
    /// teacher's `load_settings` behaviour for a fresh install.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        if !path.exists() {
            return Ok(AppSettings::default());
        }
        let file = fs::File::open(path).map_err(SchedulerError::Io)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(SchedulerError::Serde)
    }

    /// Atomically overwrites `path` with this configuration.
    pub fn save(&self, path: &Path) -> Result<(), SchedulerError> {
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SchedulerError::Io)?;
        }
        {
            let file = fs::File::create(&tmp_path).map_err(SchedulerError::Io)?;
            serde_json::to_writer_pretty(&file, self).map_err(SchedulerError::Serde)?;
        }
        fs::rename(&tmp_path, path).map_err(SchedulerError::Io)?;
        Ok(())
    }
}
