//! Side-table mapping a task's opaque `media_key` to its probed
//! [`MediaDescriptor`] (spec.md 9: "cyclic back-references via `media_key`").
//! Persisted next to the task-graph state file so a resumed run can still
//! answer "what does this key mean" without re-probing every source file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::SchedulerError;
use crate::media::descriptor::MediaDescriptor;

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct MediaRegistry {
    entries: HashMap<String, MediaDescriptor>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        MediaRegistry::default()
    }

    pub fn insert(&mut self, media_key: impl Into<String>, descriptor: MediaDescriptor) {
        self.entries.insert(media_key.into(), descriptor);
    }

    pub fn get(&self, media_key: &str) -> Option<&MediaDescriptor> {
        self.entries.get(media_key)
    }

    pub fn merge(&mut self, other: MediaRegistry) {
        self.entries.extend(other.entries);
    }

    /// Sibling path next to a task-graph state file, e.g.
    /// `tasks.json` -> `tasks.media.json`.
    pub fn sibling_path(state_path: &Path) -> PathBuf {
        let stem = state_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "tasks".to_string());
        let dir = state_path.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!("{stem}.media.json"))
    }

    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        if !path.exists() {
            return Ok(MediaRegistry::new());
        }
        let file = File::open(path).map_err(SchedulerError::Io)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(SchedulerError::Serde)
    }

    pub fn save(&self, path: &Path) -> Result<(), SchedulerError> {
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SchedulerError::Io)?;
        }
        {
            let file = File::create(&tmp_path).map_err(SchedulerError::Io)?;
            serde_json::to_writer_pretty(&file, self).map_err(SchedulerError::Serde)?;
        }
        fs::rename(&tmp_path, path).map_err(SchedulerError::Io)?;
        Ok(())
    }
}
