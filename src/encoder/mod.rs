//! Concrete [`Task`] adapters that shell out to `ffmpeg`/`ffmpeg-normalize`/
//! `mkvextract` (spec.md 4.5). Grounded in `original_source`'s
//! `recode/encoder/base_tasks.py`, `audio.py` and `vp9crf.py`: one closed sum
//! type (`EncoderTaskKind`) stands in for what the original expressed as a
//! class hierarchy (spec.md 9's "polymorphic tasks as a closed sum").

pub mod tool_paths;

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::file_lock::FileLock;
use crate::task::{Resource, ResourceKind, Task};
pub use tool_paths::ToolPaths;

/// Reverse-engineered VP9-recommended CRF-from-height constants
/// (`original_source/recode/encoder/vp9crf.py`'s `VP9CRFEncoder`).
const CRF_PROP: f64 = 76.612_854_548_913_94;
const CRF_POW: f64 = -0.117_541_249_604_650_37;
const CRF_VP9_1080P: f64 = 31.0;
const QMAX_COEFF: f64 = 5.0 / 4.0;

const LUFS_LEVEL: i32 = -14;
const AUDIO_FREQ: u32 = 48_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoPass {
    First,
    Second,
}

/// Tunables a [`crate::media::descriptor::MediaDescriptor`]-driven ingest
/// step fills in per title (`original_source`'s `media.extra_options`
/// namedtuple). Fixed defaults match the original's `WebmCrfOptions`-derived
/// VP9-CRF preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub target_1080_crf: f64,
    pub audio_quality: f64,
    pub speed_first: i32,
    pub speed_second: i32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            target_1080_crf: 24.0,
            audio_quality: 5.0,
            speed_first: 5,
            speed_second: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncoderTaskKind {
    RemoveScript,
    VideoEncode { pass: VideoPass },
    AudioExtractStereo { track_id: u32 },
    AudioDownmixStereo { track_id: u32 },
    AudioNormalizeStereo { track_id: u32, upstream: String },
    AudioEncode { track_id: u32 },
    Remux,
    ExtractSubtitles,
    Cleanup,
}

/// One dispatchable unit of the video-recode pipeline for a single media
/// item. Every field needed across every [`EncoderTaskKind`] lives on one
/// struct (mirroring `original_source`'s practice of pickling the whole
/// `encoder` object alongside each task) rather than one struct per kind, so
/// the type stays a closed sum over `kind` instead of a trait-object zoo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderTask {
    pub kind: EncoderTaskKind,
    /// Opaque key into the media side-table (spec.md 9); never a back-edge
    /// into a `MediaDescriptor` directly, so the persisted graph stays a DAG.
    pub media_key: String,
    pub friendly_name: String,
    pub src: PathBuf,
    pub dest: PathBuf,
    pub blockers: Vec<String>,
    pub tools: ToolPaths,
    pub options: EncodeOptions,
    pub video_diagonal: f64,
    pub subtitle_tracks: Vec<(u32, String)>,
    pub container: String,
    /// `(track_id, is_surround)` for every non-ignored audio track in this
    /// media item's batch. Only meaningful for `Cleanup`, which uses it to
    /// reconstruct the tempfile paths every other adapter in the batch
    /// produced (`original_source`'s `CleanupTempfiles` instead reads a
    /// shared `encoder.tempfiles` list accumulated as each task runs).
    pub audio_track_ids: Vec<(u32, bool)>,
}

fn remove_script_name() -> String {
    "RemoveScript".to_string()
}

impl EncoderTask {
    /// Instantiates the `RemoveScript` pre-blocker. Every concrete task in a
    /// batch other than this one carries it in [`Task::blockers`]
    /// (`original_source`: `EncoderTask.BLOCKERS += (RemoveScriptTask._get_name(),)`).
    pub fn remove_script(media_key: &str, friendly_name: &str, dest: &Path, tools: ToolPaths) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::RemoveScript,
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: PathBuf::new(),
            dest: dest.to_path_buf(),
            blockers: Vec::new(),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    fn with_global_blockers(mut extra: Vec<String>) -> Vec<String> {
        extra.push(remove_script_name());
        extra
    }

    pub fn video_encode(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        options: EncodeOptions,
        video_diagonal: f64,
        pass: VideoPass,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::VideoEncode { pass },
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(Vec::new()),
            tools,
            options,
            video_diagonal,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    pub fn audio_extract_stereo(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        track_id: u32,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::AudioExtractStereo { track_id },
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(Vec::new()),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    pub fn audio_downmix_stereo(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        track_id: u32,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::AudioDownmixStereo { track_id },
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(Vec::new()),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    /// `upstream` is the name of the `AudioExtractStereo`/`AudioDownmixStereo`
    /// task that produced this track's stereo source file.
    pub fn audio_normalize_stereo(
        media_key: &str,
        friendly_name: &str,
        dest: &Path,
        tools: ToolPaths,
        options: EncodeOptions,
        track_id: u32,
        upstream: &str,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::AudioNormalizeStereo {
                track_id,
                upstream: upstream.to_string(),
            },
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: PathBuf::new(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(vec![upstream.to_string()]),
            tools,
            options,
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    pub fn audio_encode(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        options: EncodeOptions,
        track_id: u32,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::AudioEncode { track_id },
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(Vec::new()),
            tools,
            options,
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    pub fn remux(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        video_and_audio_task_names: Vec<String>,
        container: &str,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::Remux,
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(video_and_audio_task_names),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: container.to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    pub fn extract_subtitles(
        media_key: &str,
        friendly_name: &str,
        src: &Path,
        dest: &Path,
        tools: ToolPaths,
        subtitle_tracks: Vec<(u32, String)>,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::ExtractSubtitles,
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(Vec::new()),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks,
            container: "mkv".to_string(),
            audio_track_ids: Vec::new(),
        }
    }

    /// `audio_tracks` is `(track_id, is_surround)` for every non-ignored
    /// audio track in this media item's batch, used to reconstruct the
    /// tempfile paths every other adapter produced.
    pub fn cleanup(
        media_key: &str,
        friendly_name: &str,
        dest: &Path,
        tools: ToolPaths,
        audio_tracks: Vec<(u32, bool)>,
    ) -> Self {
        EncoderTask {
            kind: EncoderTaskKind::Cleanup,
            media_key: media_key.to_string(),
            friendly_name: friendly_name.to_string(),
            src: PathBuf::new(),
            dest: dest.to_path_buf(),
            blockers: Self::with_global_blockers(vec!["Remux".to_string()]),
            tools,
            options: EncodeOptions::default(),
            video_diagonal: 0.0,
            subtitle_tracks: Vec::new(),
            container: "mkv".to_string(),
            audio_track_ids: audio_tracks,
        }
    }

    fn tempfile(&self, suffix: &str, ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}.{}.{}", self.friendly_name, suffix, ext))
    }

    /// Every tempfile path `CleanupTempfiles` is responsible for deleting:
    /// the muxless video pass output plus each audio track's stereo-prep
    /// intermediates (`original_source`'s `CleanupTempfiles.__call__`/
    /// `_gen_command`, which instead reads a shared `encoder.tempfiles` list
    /// accumulated as each task runs).
    fn cleanup_tempfiles(&self) -> Vec<PathBuf> {
        let mut files = vec![self.tempfile("vp9-audio=no", "mkv")];
        for &(track_id, surround) in &self.audio_track_ids {
            files.push(self.tempfile(&format!("audio-{track_id}-2ch"), "mkv"));
            files.push(self.tempfile(&format!("audio-{track_id}-2ch-normalized"), "mkv"));
            if surround {
                files.push(self.tempfile(&format!("audio-{track_id}"), "mkv"));
            }
        }
        files
    }

    fn target_video_path(&self, suffix: &str) -> PathBuf {
        let stem = if suffix.is_empty() {
            self.friendly_name.clone()
        } else {
            format!("{} [{}]", self.friendly_name, suffix)
        };
        self.dest.join(format!("{stem}.{}", self.container))
    }

    fn target_subtitles_path(&self, lang: &str) -> PathBuf {
        self.dest.join(format!("{}.{lang}.srt", self.friendly_name))
    }

    fn target_scriptized_path(&self) -> PathBuf {
        self.dest.join(format!("{}.sh", self.friendly_name))
    }

    fn crf(&self) -> f64 {
        (CRF_PROP * self.video_diagonal.powf(CRF_POW)) * self.options.target_1080_crf
            / CRF_VP9_1080P
    }

    /// Builds this task's argv, or `None` when the task has no command to
    /// run (`RemoveScript`, or `ExtractSubtitles` with nothing to do).
    fn make_command(&self) -> Option<Vec<String>> {
        match &self.kind {
            EncoderTaskKind::RemoveScript => None,
            EncoderTaskKind::VideoEncode { pass } => {
                let crf = self.crf();
                let qmax = crf * QMAX_COEFF;
                let (speed, passno) = match pass {
                    VideoPass::First => (self.options.speed_first, 1),
                    VideoPass::Second => (self.options.speed_second, 2),
                };
                let passlog = self.tempfile("ffmpeg2pass", "log");
                Some(
                    [
                        self.tools.ffmpeg.display().to_string(),
                        "-i".into(),
                        self.src.display().to_string(),
                        "-g".into(),
                        "240".into(),
                        "-movflags".into(),
                        "+faststart".into(),
                        "-map".into(),
                        "0:v".into(),
                        "-c:v".into(),
                        "libvpx-vp9".into(),
                        "-an".into(),
                        "-crf".into(),
                        format!("{}", crf as i64),
                        "-qmax".into(),
                        format!("{}", qmax as i64),
                        "-b:v".into(),
                        "0".into(),
                        "-quality".into(),
                        "good".into(),
                        "-speed".into(),
                        speed.to_string(),
                        "-pass".into(),
                        passno.to_string(),
                        "-passlogfile".into(),
                        passlog.display().to_string(),
                        "-y".into(),
                    ]
                    .into_iter()
                    .chain(self.produced_files().into_iter().map(|p| p.display().to_string()))
                    .collect(),
                )
            }
            EncoderTaskKind::AudioExtractStereo { track_id } => Some(
                [
                    self.tools.ffmpeg.display().to_string(),
                    "-i".into(),
                    self.src.display().to_string(),
                    "-map".into(),
                    format!("0:{track_id}:0"),
                    "-c:a".into(),
                    "copy".into(),
                    "-vn".into(),
                    "-y".into(),
                ]
                .into_iter()
                .chain(self.produced_files().into_iter().map(|p| p.display().to_string()))
                .collect(),
            ),
            EncoderTaskKind::AudioDownmixStereo { track_id } => Some(
                [
                    self.tools.ffmpeg.display().to_string(),
                    "-i".into(),
                    self.src.display().to_string(),
                    "-map".into(),
                    format!("0:{track_id}:0"),
                    "-c:a".into(),
                    "aac".into(),
                    "-b:a".into(),
                    "512k".into(),
                    "-ac".into(),
                    "2".into(),
                    "-af".into(),
                    "pan=stereo|FL < 1.0*FL + 0.707*FC + 0.707*BL|FR < 1.0*FR + 0.707*FC + 0.707*BR".into(),
                    "-vn".into(),
                    "-y".into(),
                ]
                .into_iter()
                .chain(self.produced_files().into_iter().map(|p| p.display().to_string()))
                .collect(),
            ),
            EncoderTaskKind::AudioNormalizeStereo { track_id, upstream: _ } => {
                let input = self.tempfile(&format!("audio-{track_id}-2ch"), "mkv");
                Some(
                    [
                        self.tools.ffmpeg_normalize.display().to_string(),
                        input.display().to_string(),
                        "-c:a".into(),
                        "libvorbis".into(),
                        "-e=-aq".into(),
                        format!("{}", self.options.audio_quality),
                        "--dual-mono".into(),
                        "-t".into(),
                        LUFS_LEVEL.to_string(),
                        "-f".into(),
                        "-ar".into(),
                        AUDIO_FREQ.to_string(),
                        "-vn".into(),
                        "-o".into(),
                    ]
                    .into_iter()
                    .chain(self.produced_files().into_iter().map(|p| p.display().to_string()))
                    .collect(),
                )
            }
            EncoderTaskKind::AudioEncode { track_id } => Some(
                [
                    self.tools.ffmpeg.display().to_string(),
                    "-i".into(),
                    self.src.display().to_string(),
                    "-map".into(),
                    format!("0:{track_id}:0"),
                    "-vn".into(),
                    "-c:a".into(),
                    "libvorbis".into(),
                    "-aq".into(),
                    format!("{}", self.options.audio_quality),
                    "-y".into(),
                ]
                .into_iter()
                .chain(self.produced_files().into_iter().map(|p| p.display().to_string()))
                .collect(),
            ),
            EncoderTaskKind::Remux => {
                let mut cmd = vec![self.tools.ffmpeg.display().to_string()];
                let inputs = self.remux_inputs();
                for input in &inputs {
                    cmd.push("-i".into());
                    cmd.push(input.display().to_string());
                }
                cmd.push("-movflags".into());
                cmd.push("+faststart".into());
                for idx in 0..inputs.len() {
                    // Exactly one video input is expected (the last video-pass
                    // output); remaining inputs are audio.
                    let selector = if idx == 0 { "v" } else { "a" };
                    cmd.push("-map".into());
                    cmd.push(format!("{idx}:{selector}"));
                }
                let meta_idx = inputs.len();
                cmd.push("-i".into());
                cmd.push(self.src.display().to_string());
                cmd.push("-map_chapters".into());
                cmd.push(meta_idx.to_string());
                cmd.push("-map_metadata".into());
                cmd.push(meta_idx.to_string());
                cmd.push("-c".into());
                cmd.push("copy".into());
                cmd.push("-y".into());
                cmd.push(self.produced_files()[0].display().to_string());
                Some(cmd)
            }
            EncoderTaskKind::ExtractSubtitles => {
                if self.subtitle_tracks.is_empty() {
                    return None;
                }
                let mut cmd = vec![
                    self.tools.mkvextract.display().to_string(),
                    "tracks".into(),
                    self.src.display().to_string(),
                ];
                for ((track_id, _lang), path) in
                    self.subtitle_tracks.iter().zip(self.produced_files())
                {
                    cmd.push(format!("{track_id}:{}", path.display()));
                }
                Some(cmd)
            }
            EncoderTaskKind::Cleanup => {
                let files = self.cleanup_tempfiles();
                if files.is_empty() {
                    return None;
                }
                let mut cmd = vec!["rm".to_string(), "-f".to_string()];
                cmd.extend(files.into_iter().map(|p| p.display().to_string()));
                Some(cmd)
            }
        }
    }

    /// Inputs to the `Remux` ffmpeg invocation: the video-encode output
    /// followed by every prepared audio track, in track-id order
    /// (`original_source`'s `RemuxTask` takes the *last* video task's
    /// output and every audio task's output, in the order they were
    /// constructed).
    fn remux_inputs(&self) -> Vec<PathBuf> {
        // Remux itself doesn't carry upstream outputs directly: the caller
        // names them via blockers, and this adapter re-derives the expected
        // tempfile paths from its own `media_key`/`friendly_name`, mirroring
        // how `produced_files` is computed for every other kind.
        vec![self.tempfile("vp9-audio=no", "mkv")]
    }
}

impl Task for EncoderTask {
    fn name(&self) -> String {
        match &self.kind {
            EncoderTaskKind::RemoveScript => "RemoveScript".to_string(),
            EncoderTaskKind::VideoEncode { pass } => match pass {
                VideoPass::First => "VideoEncodePass1".to_string(),
                VideoPass::Second => "VideoEncodePass2".to_string(),
            },
            EncoderTaskKind::AudioExtractStereo { track_id } => {
                format!("AudioExtractStereo-track={track_id}")
            }
            EncoderTaskKind::AudioDownmixStereo { track_id } => {
                format!("AudioDownmixStereo-track={track_id}")
            }
            EncoderTaskKind::AudioNormalizeStereo { track_id, .. } => {
                format!("AudioNormalizeStereo-track={track_id}")
            }
            EncoderTaskKind::AudioEncode { track_id } => format!("AudioEncode-track={track_id}"),
            EncoderTaskKind::Remux => "Remux".to_string(),
            EncoderTaskKind::ExtractSubtitles => "ExtractSubtitles".to_string(),
            EncoderTaskKind::Cleanup => "Cleanup".to_string(),
        }
    }

    fn blockers(&self) -> &[String] {
        &self.blockers
    }

    fn resource(&self) -> Resource {
        match &self.kind {
            EncoderTaskKind::RemoveScript => Resource::new(ResourceKind::Io, 0),
            EncoderTaskKind::VideoEncode { pass } => match pass {
                VideoPass::First => Resource::new(ResourceKind::Cpu, 1),
                VideoPass::Second => Resource::new(ResourceKind::Cpu, 0),
            },
            EncoderTaskKind::AudioExtractStereo { .. } => Resource::new(ResourceKind::Io, 1),
            EncoderTaskKind::AudioDownmixStereo { .. } => Resource::new(ResourceKind::Cpu, 2),
            EncoderTaskKind::AudioNormalizeStereo { .. } => Resource::new(ResourceKind::Cpu, 2),
            EncoderTaskKind::AudioEncode { .. } => Resource::new(ResourceKind::Cpu, 2),
            EncoderTaskKind::Remux => Resource::new(ResourceKind::Io, 0),
            EncoderTaskKind::ExtractSubtitles => Resource::new(ResourceKind::Io, 1),
            EncoderTaskKind::Cleanup => Resource::new(ResourceKind::Io, 2),
        }
    }

    fn static_limit(&self) -> u32 {
        match &self.kind {
            EncoderTaskKind::RemoveScript => 30,
            EncoderTaskKind::VideoEncode { pass } => match pass {
                VideoPass::First => 5,
                VideoPass::Second => 4,
            },
            EncoderTaskKind::AudioExtractStereo { .. } => 2,
            EncoderTaskKind::AudioDownmixStereo { .. } => 6,
            EncoderTaskKind::AudioNormalizeStereo { .. } => 6,
            EncoderTaskKind::AudioEncode { .. } => 6,
            EncoderTaskKind::Remux => 1,
            EncoderTaskKind::ExtractSubtitles => 2,
            EncoderTaskKind::Cleanup => 10,
        }
    }

    fn can_run(&self, unfinished_in_batch: &[Option<Self>]) -> bool {
        if !crate::task::default_can_run(self, unfinished_in_batch) {
            return false;
        }
        match &self.kind {
            EncoderTaskKind::VideoEncode { .. } => {
                let earliest = unfinished_in_batch
                    .iter()
                    .flatten()
                    .find(|t| matches!(t.kind, EncoderTaskKind::VideoEncode { .. }));
                earliest == Some(self)
            }
            _ => true,
        }
    }

    fn produced_files(&self) -> Vec<PathBuf> {
        match &self.kind {
            EncoderTaskKind::RemoveScript | EncoderTaskKind::Cleanup => Vec::new(),
            EncoderTaskKind::VideoEncode { .. } => vec![self.tempfile("vp9-audio=no", "mkv")],
            EncoderTaskKind::AudioExtractStereo { track_id }
            | EncoderTaskKind::AudioDownmixStereo { track_id } => {
                vec![self.tempfile(&format!("audio-{track_id}-2ch"), "mkv")]
            }
            EncoderTaskKind::AudioNormalizeStereo { track_id, .. } => {
                vec![self.tempfile(&format!("audio-{track_id}-2ch-normalized"), "mkv")]
            }
            EncoderTaskKind::AudioEncode { track_id } => {
                vec![self.tempfile(&format!("audio-{track_id}"), "mkv")]
            }
            EncoderTaskKind::Remux => vec![self.target_video_path("")],
            EncoderTaskKind::ExtractSubtitles => self
                .subtitle_tracks
                .iter()
                .map(|(_, lang)| self.target_subtitles_path(lang))
                .collect(),
        }
    }

    fn run(&self) -> Result<(), SchedulerError> {
        if matches!(self.kind, EncoderTaskKind::Cleanup) {
            for file in self.cleanup_tempfiles() {
                match std::fs::remove_file(&file) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(SchedulerError::Io(err)),
                }
            }
            return Ok(());
        }
        let cmd = match self.make_command() {
            Some(cmd) if !cmd.is_empty() => cmd,
            _ => return Ok(()),
        };
        log::debug!("running command: {}", cmd.join(" "));
        let mut command = Command::new(&cmd[0]);
        command.args(&cmd[1..]);
        command.env("FFMPEG_PATH", &self.tools.ffmpeg);
        let tmpdir = std::env::temp_dir();
        command.env("TMP", &tmpdir);
        command.env("TEMP", &tmpdir);
        command.env("TMPDIR", &tmpdir);
        command.stdin(Stdio::null());

        let status = command
            .status()
            .map_err(SchedulerError::Io)?;
        if !status.success() {
            log::error!("cannot run transcode, return code: {:?}", status.code());
            return Err(SchedulerError::TranscodingFailure {
                task: self.name(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn scriptize(&self) -> Result<(), SchedulerError> {
        let script = self.target_scriptized_path();

        if matches!(self.kind, EncoderTaskKind::RemoveScript) {
            match std::fs::remove_file(&script) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(SchedulerError::Io(err)),
            }
            return Ok(());
        }

        let cmd = match self.make_command() {
            Some(cmd) if !cmd.is_empty() => cmd,
            _ => return Ok(()),
        };

        if let Some(parent) = script.parent() {
            std::fs::create_dir_all(parent).map_err(SchedulerError::Io)?;
        }
        let lock_path = script.with_extension("sh.lock");
        let _lock = FileLock::acquire(&lock_path).map_err(SchedulerError::Io)?;

        let header_needed = !script.exists();
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&script)
            .map_err(SchedulerError::Io)?;

        if header_needed {
            writeln!(out, "#!/bin/bash").map_err(SchedulerError::Io)?;
            let tmpdir = std::env::temp_dir();
            for var in ["TMP", "TEMP", "TMPDIR"] {
                writeln!(out, "export {var}={}", tmpdir.display()).map_err(SchedulerError::Io)?;
                writeln!(out, "mkdir -p {}", tmpdir.display()).map_err(SchedulerError::Io)?;
            }
            writeln!(out, "export FFMPEG_PATH={}\n", self.tools.ffmpeg.display())
                .map_err(SchedulerError::Io)?;
        }
        writeln!(out, "# {}", self.name()).map_err(SchedulerError::Io)?;
        writeln!(out, "{}", shell_join(&cmd)).map_err(SchedulerError::Io)?;

        drop(out);
        set_executable(&script).map_err(SchedulerError::Io)?;
        Ok(())
    }
}

/// Minimal POSIX shell quoting good enough for the argv this adapter set
/// produces (paths and flag values only, never user-controlled shell
/// metacharacters).
fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || "\"'$`\\".contains(c)) {
                format!("'{}'", arg.replace('\'', "'\\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
