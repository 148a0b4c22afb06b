//! Media identity, probing, filename parsing, and track-selection
//! interfaces (spec.md 1, 6, 9). Everything in this module is an
//! external-collaborator boundary per spec.md's Non-goals: the scheduler
//! core only ever sees the [`crate::encoder::EncoderTask`] batch this module
//! produces, never a [`descriptor::MediaDescriptor`] directly.

pub mod descriptor;
pub mod interactive;
pub mod parser;
pub mod probe;
pub mod registry;

use std::collections::HashSet;
use std::path::Path;

use crate::encoder::{EncoderTask, ToolPaths};
use crate::media::descriptor::MediaDescriptor;
use crate::media::parser::ParsedMedia;

/// Builds the full task batch for one media item
/// (`original_source/recode/encoder/base_encoder.py`'s `BaseEncoder.make_tasks`):
/// `RemoveScript`, both video-encode passes, one stereo-preparation +
/// normalize (+ encode, for non-stereo tracks) pair per non-ignored audio
/// track, `Remux`, `ExtractSubtitles`, then `Cleanup`.
pub fn build_batch(
    parsed: &ParsedMedia,
    descriptor: &MediaDescriptor,
    src: &Path,
    dest: &Path,
    tools: ToolPaths,
    ignored_audio_tracks: &HashSet<u32>,
) -> Vec<EncoderTask> {
    let media_key = &parsed.media_key;
    let friendly_name = &parsed.friendly_name;
    let video_diagonal = descriptor.video_diagonal();

    let mut tasks = Vec::new();
    tasks.push(EncoderTask::remove_script(media_key, friendly_name, dest, tools.clone()));

    let video_pass1 = EncoderTask::video_encode(
        media_key,
        friendly_name,
        src,
        dest,
        tools.clone(),
        parsed.options,
        video_diagonal,
        crate::encoder::VideoPass::First,
    );
    let video_pass2 = EncoderTask::video_encode(
        media_key,
        friendly_name,
        src,
        dest,
        tools.clone(),
        parsed.options,
        video_diagonal,
        crate::encoder::VideoPass::Second,
    );
    let mut video_and_audio_names = vec![video_pass1.name(), video_pass2.name()];
    tasks.push(video_pass1);
    tasks.push(video_pass2);

    let stereo_ids: HashSet<u32> = descriptor.stereo_audio_tracks().into_iter().collect();
    let surround_ids: HashSet<u32> = descriptor.surround_audio_tracks().into_iter().collect();
    let mut cleanup_tracks: Vec<(u32, bool)> = Vec::new();

    for track in &descriptor.audio_tracks {
        if ignored_audio_tracks.contains(&track.track_id) {
            log::info!("skipping audio track {} in \"{friendly_name}\"", track.track_id);
            continue;
        }
        let surround = surround_ids.contains(&track.track_id);
        cleanup_tracks.push((track.track_id, surround));

        let prepare = if stereo_ids.contains(&track.track_id) {
            EncoderTask::audio_extract_stereo(media_key, friendly_name, src, dest, tools.clone(), track.track_id)
        } else {
            EncoderTask::audio_downmix_stereo(media_key, friendly_name, src, dest, tools.clone(), track.track_id)
        };
        let prepare_name = prepare.name();

        let normalize = EncoderTask::audio_normalize_stereo(
            media_key,
            friendly_name,
            dest,
            tools.clone(),
            parsed.options,
            track.track_id,
            &prepare_name,
        );
        video_and_audio_names.push(normalize.name());

        tasks.push(prepare);
        tasks.push(normalize);

        if surround {
            let encode = EncoderTask::audio_encode(
                media_key,
                friendly_name,
                src,
                dest,
                tools.clone(),
                parsed.options,
                track.track_id,
            );
            video_and_audio_names.push(encode.name());
            tasks.push(encode);
        }
    }

    let remux = EncoderTask::remux(
        media_key,
        friendly_name,
        src,
        dest,
        tools.clone(),
        video_and_audio_names,
        &parsed.container,
    );
    tasks.push(remux);

    if !descriptor.subtitle_tracks.is_empty() {
        let subtitle_tracks = descriptor
            .subtitle_tracks
            .iter()
            .map(|t| (t.track_id, t.language.clone()))
            .collect();
        tasks.push(EncoderTask::extract_subtitles(
            media_key,
            friendly_name,
            src,
            dest,
            tools.clone(),
            subtitle_tracks,
        ));
    }

    tasks.push(EncoderTask::cleanup(media_key, friendly_name, dest, tools, cleanup_tracks));

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeOptions;
    use crate::media::descriptor::{AudioTrackInfo, SubtitleTrackInfo};
    use crate::task::Task;
    use std::path::PathBuf;

    fn tools() -> ToolPaths {
        ToolPaths {
            ffmpeg: PathBuf::from("/usr/bin/ffmpeg"),
            ffmpeg_normalize: PathBuf::from("/usr/bin/ffmpeg-normalize"),
            mkvextract: PathBuf::from("/usr/bin/mkvextract"),
            mkvmerge: PathBuf::from("/usr/bin/mkvmerge"),
        }
    }

    fn parsed() -> ParsedMedia {
        ParsedMedia {
            media_key: "movie:Sample".into(),
            friendly_name: "Sample".into(),
            container: "webm".into(),
            options: EncodeOptions::default(),
        }
    }

    fn descriptor() -> MediaDescriptor {
        MediaDescriptor {
            width: 1920,
            height: 1080,
            audio_tracks: vec![
                AudioTrackInfo {
                    track_id: 1,
                    name: "main".into(),
                    language: "eng".into(),
                    channels: 2,
                },
                AudioTrackInfo {
                    track_id: 2,
                    name: "surround".into(),
                    language: "eng".into(),
                    channels: 6,
                },
            ],
            subtitle_tracks: vec![SubtitleTrackInfo {
                track_id: 3,
                name: "eng".into(),
                language: "eng".into(),
            }],
        }
    }

    #[test]
    fn builds_expected_task_set_with_mixed_audio_tracks() {
        let batch = build_batch(
            &parsed(),
            &descriptor(),
            Path::new("/src/in.mkv"),
            Path::new("/dest"),
            tools(),
            &HashSet::new(),
        );
        let names: Vec<String> = batch.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"RemoveScript".to_string()));
        assert!(names.contains(&"VideoEncodePass1".to_string()));
        assert!(names.contains(&"VideoEncodePass2".to_string()));
        assert!(names.contains(&"AudioExtractStereo-track=1".to_string()));
        assert!(names.contains(&"AudioDownmixStereo-track=2".to_string()));
        assert!(names.contains(&"AudioNormalizeStereo-track=1".to_string()));
        assert!(names.contains(&"AudioNormalizeStereo-track=2".to_string()));
        assert!(names.contains(&"AudioEncode-track=2".to_string()));
        assert!(names.contains(&"Remux".to_string()));
        assert!(names.contains(&"ExtractSubtitles".to_string()));
        assert!(names.contains(&"Cleanup".to_string()));
        assert!(!names.contains(&"AudioEncode-track=1".to_string()));
    }

    #[test]
    fn ignored_audio_tracks_are_skipped() {
        let mut ignored = HashSet::new();
        ignored.insert(2);
        let batch = build_batch(
            &parsed(),
            &descriptor(),
            Path::new("/src/in.mkv"),
            Path::new("/dest"),
            tools(),
            &ignored,
        );
        let names: Vec<String> = batch.iter().map(|t| t.name()).collect();
        assert!(!names.iter().any(|n| n.contains("track=2")));
    }

    #[test]
    fn remux_blocks_on_every_video_and_audio_task_name() {
        let batch = build_batch(
            &parsed(),
            &descriptor(),
            Path::new("/src/in.mkv"),
            Path::new("/dest"),
            tools(),
            &HashSet::new(),
        );
        let remux = batch.iter().find(|t| t.name() == "Remux").unwrap();
        assert!(remux.blockers().contains(&"VideoEncodePass2".to_string()));
        assert!(remux.blockers().contains(&"AudioNormalizeStereo-track=2".to_string()));
    }

    #[test]
    fn cleanup_carries_surround_flag_per_non_ignored_track() {
        let mut ignored = HashSet::new();
        ignored.insert(2);
        let batch = build_batch(
            &parsed(),
            &descriptor(),
            Path::new("/src/in.mkv"),
            Path::new("/dest"),
            tools(),
            &ignored,
        );
        let cleanup = batch.iter().find(|t| t.name() == "Cleanup").unwrap();
        assert_eq!(cleanup.audio_track_ids, vec![(1, false)]);
    }
}
