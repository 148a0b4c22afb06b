//! Dependency-injected tool resolver (spec.md 9: "replace the global `which`
//! cache... do not retain process-global mutable state"). Computed once at
//! startup and threaded into task construction as a plain value, rather than
//! the original's lazily-populated global `_which_cache` dict
//! (`original_source/recode/helpers.py`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ToolOverrides;
use crate::error::SchedulerError;

/// Resolved paths to every external binary the encoder-task adapters shell
/// out to. Persisted as part of each [`super::EncoderTask`] (mirroring the
/// original, which pickled the whole `encoder` object — FFMPEG path
/// included — alongside each task), so a resumed task keeps using the tool
/// path it was ingested with rather than re-resolving against a possibly
/// different `PATH` on relaunch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffmpeg_normalize: PathBuf,
    pub mkvextract: PathBuf,
    pub mkvmerge: PathBuf,
}

impl ToolPaths {
    /// Resolves every tool: explicit config override, else the matching
    /// `*_PATH` environment variable, else a `PATH` search (spec.md 6).
    pub fn resolve(overrides: &ToolOverrides) -> Result<Self, SchedulerError> {
        Ok(ToolPaths {
            ffmpeg: resolve_one("ffmpeg", "FFMPEG_PATH", overrides.ffmpeg_path.as_deref())?,
            ffmpeg_normalize: resolve_one(
                "ffmpeg-normalize",
                "FFMPEG_NORM_PATH",
                overrides.ffmpeg_normalize_path.as_deref(),
            )?,
            mkvextract: resolve_one(
                "mkvextract",
                "MKVEXTRACT_PATH",
                overrides.mkvextract_path.as_deref(),
            )?,
            mkvmerge: resolve_one(
                "mkvmerge",
                "MKVMERGE_PATH",
                overrides.mkvmerge_path.as_deref(),
            )?,
        })
    }
}

fn resolve_one(
    bin_name: &str,
    env_name: &str,
    override_path: Option<&Path>,
) -> Result<PathBuf, SchedulerError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(env_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    search_path(bin_name).ok_or_else(|| SchedulerError::ToolNotFound(bin_name.to_string()))
}

fn search_path(bin_name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(bin_name);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if is_executable_file(&exe) {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_takes_precedence_over_env_and_path() {
        let overrides = ToolOverrides {
            ffmpeg_path: Some(PathBuf::from("/custom/ffmpeg")),
            ..ToolOverrides::default()
        };
        let resolved = resolve_one("ffmpeg", "FFMPEG_PATH", overrides.ffmpeg_path.as_deref())
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/custom/ffmpeg"));
    }

    #[test]
    fn missing_tool_reports_tool_not_found() {
        let err = resolve_one("definitely-not-a-real-binary-xyz", "NOPE_PATH", None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ToolNotFound(name) if name == "definitely-not-a-real-binary-xyz"));
    }
}
