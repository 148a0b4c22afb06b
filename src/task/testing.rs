//! A synthetic [`Task`] implementation used to exercise the scheduler core
//! (admission, blocker safety, resume) independently of the concrete
//! encoder-task adapters, which need real subprocesses to be meaningful.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::{Resource, Task};
use crate::error::SchedulerError;

static RUN_COUNTS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static RUN_ATTEMPTS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static SCRIPT_COUNTS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static FAIL_ON_RUN: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub fn reset_counters() {
    RUN_COUNTS.lock().unwrap().clear();
    RUN_ATTEMPTS.lock().unwrap().clear();
    SCRIPT_COUNTS.lock().unwrap().clear();
    FAIL_ON_RUN.lock().unwrap().clear();
}

pub fn run_count(key: &str) -> usize {
    *RUN_COUNTS.lock().unwrap().get(key).unwrap_or(&0)
}

/// Counts every `run()` call regardless of outcome, unlike [`run_count`]
/// which only counts successes. Used to tell "never dispatched" apart from
/// "dispatched and failed" in resume tests.
pub fn run_attempts(key: &str) -> usize {
    *RUN_ATTEMPTS.lock().unwrap().get(key).unwrap_or(&0)
}

pub fn script_count(key: &str) -> usize {
    *SCRIPT_COUNTS.lock().unwrap().get(key).unwrap_or(&0)
}

/// Makes `key`'s next `n` calls to `run()` fail with a synthetic
/// `TranscodingFailure`, after which it succeeds. Used to exercise S4
/// (failing task stays unmarked, subsequent run re-attempts it).
pub fn fail_next_runs(key: &str, n: usize) {
    FAIL_ON_RUN.lock().unwrap().insert(key.to_string(), n);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticTask {
    /// Identity key. Also doubles as the run/scriptize counter key.
    id: String,
    name: String,
    blockers: Vec<String>,
    resource: Resource,
    limit: u32,
    #[serde(default = "default_true")]
    do_script: bool,
    /// Only [`VideoPassMarker::First`]/[`VideoPassMarker::Second`] tasks get
    /// the multi-pass serialisation override; everything else uses the
    /// default `can_run`.
    #[serde(default)]
    video_pass: Option<VideoPassMarker>,
    /// Milliseconds to sleep inside `run()` before recording completion.
    /// Used to give concurrency tests (e.g. a concurrent state-file append)
    /// a deterministic window instead of racing real wall-clock timing.
    #[serde(default)]
    run_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoPassMarker {
    First,
    Second,
}

impl SyntheticTask {
    pub fn new(id: &str, blockers: &[&str], resource: Resource, limit: u32) -> Self {
        SyntheticTask {
            id: id.to_string(),
            name: id.to_string(),
            blockers: blockers.iter().map(|s| s.to_string()).collect(),
            resource,
            limit,
            do_script: true,
            video_pass: None,
            run_delay_ms: 0,
        }
    }

    pub fn video_pass(mut self, marker: VideoPassMarker) -> Self {
        self.video_pass = Some(marker);
        self
    }

    pub fn run_delay(mut self, delay: std::time::Duration) -> Self {
        self.run_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Task for SyntheticTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn blockers(&self) -> &[String] {
        &self.blockers
    }

    fn resource(&self) -> Resource {
        self.resource
    }

    fn static_limit(&self) -> u32 {
        self.limit
    }

    fn can_run(&self, unfinished_in_batch: &[Option<Self>]) -> bool {
        if !super::default_can_run(self, unfinished_in_batch) {
            return false;
        }
        match self.video_pass {
            None => true,
            Some(_) => {
                let earliest = unfinished_in_batch
                    .iter()
                    .flatten()
                    .find(|t| t.video_pass.is_some());
                earliest == Some(self)
            }
        }
    }

    fn produced_files(&self) -> Vec<std::path::PathBuf> {
        Vec::new()
    }

    fn do_script(&self) -> bool {
        self.do_script
    }

    fn run(&self) -> Result<(), SchedulerError> {
        if self.run_delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.run_delay_ms));
        }
        *RUN_ATTEMPTS.lock().unwrap().entry(self.id.clone()).or_insert(0) += 1;
        let mut fail_map = FAIL_ON_RUN.lock().unwrap();
        if let Some(remaining) = fail_map.get_mut(&self.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SchedulerError::TranscodingFailure {
                    task: self.id.clone(),
                    status: 1,
                });
            }
        }
        drop(fail_map);
        *RUN_COUNTS.lock().unwrap().entry(self.id.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn scriptize(&self) -> Result<(), SchedulerError> {
        *SCRIPT_COUNTS.lock().unwrap().entry(self.id.clone()).or_insert(0) += 1;
        Ok(())
    }
}
