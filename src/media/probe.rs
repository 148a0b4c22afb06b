//! Media probing as an external-collaborator interface (spec.md 1
//! Non-goals: probing internals are out of scope for the scheduler core).
//! The default adapter shells out to `mkvmerge -J` and parses its JSON
//! identification output, grounded in `original_source/recode/media/info.py`'s
//! `MediaInfo.parse`/`get_audio_tracks`/`get_subtitles`/`get_video_dimensions`.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::SchedulerError;
use crate::media::descriptor::{AudioTrackInfo, MediaDescriptor, SubtitleTrackInfo};

/// An external inspector invocation that turns a source file into a
/// [`MediaDescriptor`]. Kept as a trait so tests can substitute a fixture
/// without actually shelling out to `mkvmerge`.
pub trait MediaProbe {
    fn probe(&self, path: &Path) -> Result<MediaDescriptor, SchedulerError>;
}

pub struct MkvmergeProbe {
    pub mkvmerge_path: std::path::PathBuf,
}

impl MediaProbe for MkvmergeProbe {
    fn probe(&self, path: &Path) -> Result<MediaDescriptor, SchedulerError> {
        let output = Command::new(&self.mkvmerge_path)
            .arg("-J")
            .arg(path)
            .output()
            .map_err(SchedulerError::Io)?;
        if !output.status.success() {
            return Err(SchedulerError::BadParameters {
                media_type: "probe".to_string(),
                message: format!(
                    "mkvmerge exited with status {:?} for {}",
                    output.status.code(),
                    path.display()
                ),
            });
        }
        let identification: MkvmergeIdentification = serde_json::from_slice(&output.stdout)
            .map_err(SchedulerError::Serde)?;
        identification.into_descriptor(path)
    }
}

#[derive(Debug, Deserialize)]
struct MkvmergeIdentification {
    tracks: Vec<MkvmergeTrack>,
}

#[derive(Debug, Deserialize)]
struct MkvmergeTrack {
    id: u32,
    codec: String,
    #[serde(rename = "type")]
    track_type: String,
    properties: MkvmergeTrackProperties,
}

#[derive(Debug, Default, Deserialize)]
struct MkvmergeTrackProperties {
    audio_channels: Option<u32>,
    language: Option<String>,
    track_name: Option<String>,
    pixel_dimensions: Option<String>,
}

impl MkvmergeIdentification {
    fn into_descriptor(self, path: &Path) -> Result<MediaDescriptor, SchedulerError> {
        let (width, height) = self
            .tracks
            .iter()
            .find_map(|track| {
                let dims = track.properties.pixel_dimensions.as_ref()?;
                let (w, h) = dims.split_once('x')?;
                Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?))
            })
            .ok_or_else(|| SchedulerError::BadParameters {
                media_type: "probe".to_string(),
                message: format!("cannot determine video dimensions for {}", path.display()),
            })?;

        let mut seen_names: HashSet<String> = HashSet::new();
        let mut seen_langs: HashSet<String> = HashSet::new();
        let mut audio_tracks = Vec::new();
        let mut subtitle_tracks = Vec::new();

        for track in &self.tracks {
            if let Some(channels) = track.properties.audio_channels {
                audio_tracks.push(AudioTrackInfo {
                    track_id: track.id,
                    name: track
                        .properties
                        .track_name
                        .clone()
                        .unwrap_or_else(|| "unnamed".to_string()),
                    language: track
                        .properties
                        .language
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    channels,
                });
            } else if track.track_type == "subtitles" && track.codec == "SubRip/SRT" {
                let lang = unique_name(
                    track
                        .properties
                        .language
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    &mut seen_langs,
                );
                let base_name = track
                    .properties
                    .track_name
                    .clone()
                    .unwrap_or_else(|| lang.clone());
                let name = unique_name(base_name, &mut seen_names);
                subtitle_tracks.push(SubtitleTrackInfo {
                    track_id: track.id,
                    name,
                    language: lang,
                });
            }
        }

        Ok(MediaDescriptor {
            width,
            height,
            audio_tracks,
            subtitle_tracks,
        })
    }
}

/// Disambiguates a name against a seen-set by appending `_1`, `_2`, ...
/// (`original_source`'s `MediaInfo.__get_unique_name`).
fn unique_name(name: String, seen: &mut HashSet<String>) -> String {
    if !seen.contains(&name) {
        seen.insert(name.clone());
        return name;
    }
    let mut idx = 1;
    loop {
        let candidate = format!("{name}_{idx}");
        if !seen.contains(&candidate) {
            seen.insert(candidate.clone());
            return candidate;
        }
        idx += 1;
    }
}
