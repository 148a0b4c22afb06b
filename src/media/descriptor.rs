//! Probed media information (grounded in `original_source/recode/media/info.py`'s
//! `MediaInfo`). Tasks never hold a reference to this directly — they carry
//! an opaque `media_key: String` and look it up in a [`super::registry::MediaRegistry`]
//! side-table, which is how spec.md 9's "cyclic back-references" design note
//! keeps the persisted graph a DAG.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackInfo {
    pub track_id: u32,
    pub name: String,
    pub language: String,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrackInfo {
    pub track_id: u32,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub width: u32,
    pub height: u32,
    pub audio_tracks: Vec<AudioTrackInfo>,
    pub subtitle_tracks: Vec<SubtitleTrackInfo>,
}

impl MediaDescriptor {
    /// `hypot(width, height)`, used by video-encode command construction to
    /// derive a resolution-scaled CRF (`original_source` `vp9crf.py`'s
    /// `get_video_diagonal`). Command-construction detail, scoped out of the
    /// core by spec.md 1's Non-goals; kept here only so the default encoder
    /// adapters have something concrete to compute with.
    pub fn video_diagonal(&self) -> f64 {
        ((self.width * self.width + self.height * self.height) as f64).sqrt()
    }

    /// Track ids with 2 or fewer channels (already stereo or mono — can be
    /// copy-extracted rather than downmixed).
    pub fn stereo_audio_tracks(&self) -> Vec<u32> {
        self.audio_tracks
            .iter()
            .filter(|t| t.channels <= 2)
            .map(|t| t.track_id)
            .collect()
    }

    /// Track ids with more than 2 channels (need a downmix pass before they
    /// can be normalized to stereo).
    pub fn surround_audio_tracks(&self) -> Vec<u32> {
        self.audio_tracks
            .iter()
            .filter(|t| t.channels > 2)
            .map(|t| t.track_id)
            .collect()
    }
}
