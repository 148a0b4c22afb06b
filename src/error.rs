//! Typed error kinds for the cases callers must branch on (spec.md 7).
//! Plumbing that only needs to propagate and be logged uses `anyhow::Error`
//! wrapping these instead of matching on them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The persistent state file does not exist yet. Never fatal: the caller
    /// starts from an empty task graph.
    #[error("state file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize task graph: {0}")]
    Serde(#[from] serde_json::Error),

    /// A dispatched task's subprocess exited non-zero.
    #[error("transcoding failed for {task}: exit status {status}")]
    TranscodingFailure { task: String, status: i32 },

    /// Ingestion-time parameter validation failure; aborts ingestion.
    #[error("bad parameters for {media_type}: {message}")]
    BadParameters { media_type: String, message: String },

    /// No filename parser recognised the input and no `--force-type` was set.
    #[error("unrecognised file: {0}")]
    UnknownFile(String),

    /// No admissible candidate exists while `running` is empty but tasks
    /// remain: an invariant violation, not ordinary termination.
    #[error("scheduler stalled with {remaining} task(s) left but nothing running or admissible")]
    SchedulerStall { remaining: usize },

    /// A required external tool (ffmpeg, ffmpeg-normalize, mkvextract, the
    /// media probe) could not be resolved to an executable path.
    #[error("tool '{0}' not found: set the matching *_PATH override or install it on PATH")]
    ToolNotFound(String),

    /// Layered configuration (defaults -> JSON file -> CLI overrides) failed
    /// to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Process exit code for this error, per spec.md 6: 0 is reserved for
    /// success, argument misuse exits non-zero with a stderr message, and
    /// scheduler-internal failure exits by unhandled error (mapped here to a
    /// distinct non-zero code rather than a panic, so callers never need to
    /// guess which failure mode they hit).
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedulerError::BadParameters { .. } | SchedulerError::UnknownFile(_) => 2,
            SchedulerError::Config(_) => 3,
            SchedulerError::ToolNotFound(_) => 4,
            SchedulerError::NotFound(_) => 0,
            _ => 1,
        }
    }
}
