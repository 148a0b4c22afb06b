//! Filename parsing as an external-collaborator interface (spec.md 1
//! Non-goals: parser internals are out of scope for the scheduler core). The
//! default implementation covers the two reference media types from
//! `original_source`: a bare movie parser (`recode/media/movie.py`'s
//! `BaseMovie`, which just takes the whole filename as the title) and a
//! series-episode parser (`recode/media/series.py`'s `SeriesEpisode`, regex
//! `SxxExx` detection).

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::encoder::EncodeOptions;
use crate::error::SchedulerError;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescription {
    pub group: String,
    pub key: String,
    pub help: String,
}

/// What a [`MediaParser`] extracts from a filename: enough identity to build
/// a `media_key`/target path and the per-title encode tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMedia {
    pub media_key: String,
    pub friendly_name: String,
    pub container: String,
    pub options: EncodeOptions,
}

pub trait MediaParser: Send + Sync {
    /// Stable name used with `--force-type`.
    fn force_name(&self) -> &'static str;

    /// Attempts to recognise `file_name`. Returns
    /// [`SchedulerError::UnknownFile`] when this parser's pattern doesn't
    /// match (the caller tries the next registered parser).
    fn parse(&self, file_name: &str, file_path: &Path) -> Result<ParsedMedia, SchedulerError>;

    /// Parses under an explicit `--force-type`, applying `key=value`
    /// overrides from `--force-params`. Falls back to looser matching than
    /// [`MediaParser::parse`] (the original series parser, for instance,
    /// accepts a laxer `NN...NN` pattern once forced).
    fn parse_forced(
        &self,
        file_name: &str,
        file_path: &Path,
        params: &HashMap<String, String>,
    ) -> Result<ParsedMedia, SchedulerError>;

    fn describe_parameters(&self) -> Vec<ParameterDescription>;
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// `BaseMovie`/`SingleMovie`: the filename (minus extension) is the title,
/// no pattern to fail to match.
pub struct MovieParser;

impl MediaParser for MovieParser {
    fn force_name(&self) -> &'static str {
        "movie"
    }

    fn parse(&self, file_name: &str, _file_path: &Path) -> Result<ParsedMedia, SchedulerError> {
        let name = file_stem(file_name);
        Ok(ParsedMedia {
            media_key: format!("movie:{name}"),
            friendly_name: name,
            container: "webm".to_string(),
            options: EncodeOptions {
                target_1080_crf: 21.0,
                audio_quality: 5.0,
                speed_first: 4,
                speed_second: 1,
            },
        })
    }

    fn parse_forced(
        &self,
        file_name: &str,
        file_path: &Path,
        params: &HashMap<String, String>,
    ) -> Result<ParsedMedia, SchedulerError> {
        let mut parsed = self.parse(file_name, file_path)?;
        if let Some(name) = params.get("name") {
            parsed.friendly_name = name.clone();
            parsed.media_key = format!("movie:{name}");
        }
        apply_overrides(&mut parsed.options, params)?;
        Ok(parsed)
    }

    fn describe_parameters(&self) -> Vec<ParameterDescription> {
        vec![
            param("webm", "target_1080_crf", "default: 21"),
            param("webm", "audio_quality", "default: 5"),
            param("webm", "speed_first", "default: 4"),
            param("webm", "speed_second", "default: 1"),
            param("", "name", "Movie name"),
        ]
    }
}

static SERIES_STRICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(.*)\WS(\d+)E(\d+)(?:E\d+)?\W(.*)$").unwrap());
static SERIES_LOOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.*?)(\d+)[^\d]+(\d+)(.*)$").unwrap());

pub struct SeriesParser;

impl SeriesParser {
    fn parsed_from_captures(
        series: &str,
        season: &str,
        episode: &str,
        name: &str,
    ) -> Result<ParsedMedia, SchedulerError> {
        let season: u32 = season
            .parse()
            .map_err(|_| SchedulerError::UnknownFile(series.to_string()))?;
        let episode: u32 = episode
            .parse()
            .map_err(|_| SchedulerError::UnknownFile(series.to_string()))?;
        let friendly_name = format!("S{season:02}E{episode:02} - {}", name.trim());
        Ok(ParsedMedia {
            media_key: format!("series:{}:{season}:{episode}", series.trim()),
            friendly_name,
            container: "webm".to_string(),
            options: EncodeOptions {
                target_1080_crf: 24.0,
                audio_quality: 4.0,
                speed_first: 5,
                speed_second: 2,
            },
        })
    }
}

impl MediaParser for SeriesParser {
    fn force_name(&self) -> &'static str {
        "series"
    }

    fn parse(&self, file_name: &str, _file_path: &Path) -> Result<ParsedMedia, SchedulerError> {
        let stem = file_stem(file_name);
        let captures = SERIES_STRICT
            .captures(&stem)
            .ok_or_else(|| SchedulerError::UnknownFile(file_name.to_string()))?;
        Self::parsed_from_captures(&captures[1], &captures[2], &captures[3], &captures[4])
    }

    fn parse_forced(
        &self,
        file_name: &str,
        file_path: &Path,
        params: &HashMap<String, String>,
    ) -> Result<ParsedMedia, SchedulerError> {
        let stem = file_stem(file_name);
        let mut parsed = match self.parse(file_name, file_path) {
            Ok(parsed) => parsed,
            Err(_) => {
                let captures = SERIES_LOOSE
                    .captures(&stem)
                    .ok_or_else(|| SchedulerError::UnknownFile(file_name.to_string()))?;
                Self::parsed_from_captures(&captures[1], &captures[2], &captures[3], &captures[4])?
            }
        };
        if let Some(name) = params.get("name") {
            parsed.media_key = format!("series:{name}");
        }
        apply_overrides(&mut parsed.options, params)?;
        Ok(parsed)
    }

    fn describe_parameters(&self) -> Vec<ParameterDescription> {
        vec![
            param("webm", "target_1080_crf", "default: 24"),
            param("webm", "audio_quality", "default: 4"),
            param("webm", "speed_first", "default: 5"),
            param("webm", "speed_second", "default: 2"),
            param("", "name", "Series name"),
        ]
    }
}

fn param(group: &str, key: &str, help: &str) -> ParameterDescription {
    ParameterDescription {
        group: group.to_string(),
        key: key.to_string(),
        help: help.to_string(),
    }
}

/// `key=value` overrides onto numeric `EncodeOptions` fields
/// (`original_source/recode/helpers.py`'s `override_fields`, which rejects a
/// non-integer value for an integer field as `BadParameters`).
fn apply_overrides(
    options: &mut EncodeOptions,
    params: &HashMap<String, String>,
) -> Result<(), SchedulerError> {
    for (key, value) in params {
        match key.as_str() {
            "target_1080_crf" => options.target_1080_crf = parse_numeric(key, value)?,
            "audio_quality" => options.audio_quality = parse_numeric(key, value)?,
            "speed_first" => options.speed_first = parse_numeric(key, value)? as i32,
            "speed_second" => options.speed_second = parse_numeric(key, value)? as i32,
            "name" => {}
            other => {
                return Err(SchedulerError::BadParameters {
                    media_type: "encode_options".to_string(),
                    message: format!("unknown parameter: {other}"),
                });
            }
        }
    }
    Ok(())
}

fn parse_numeric(key: &str, value: &str) -> Result<f64, SchedulerError> {
    value.parse::<f64>().map_err(|_| SchedulerError::BadParameters {
        media_type: "encode_options".to_string(),
        message: format!("{key}: expected a numeric value, got '{value}'"),
    })
}

/// Splits a `--force-params` string of the form `key=value:key=value` into a
/// map (`original_source/main.py`'s params-string parsing).
pub fn parse_force_params(raw: &str) -> Result<HashMap<String, String>, SchedulerError> {
    let mut params = HashMap::new();
    if raw.is_empty() {
        return Ok(params);
    }
    for pair in raw.split(':') {
        let (key, value) = pair.split_once('=').ok_or_else(|| SchedulerError::BadParameters {
            media_type: "force_params".to_string(),
            message: format!("expected key=value, got '{pair}'"),
        })?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_parser_uses_filename_stem_as_title() {
        let parsed = MovieParser.parse("Cool Movie.mkv", Path::new("/src/Cool Movie.mkv")).unwrap();
        assert_eq!(parsed.friendly_name, "Cool Movie");
        assert_eq!(parsed.media_key, "movie:Cool Movie");
    }

    #[test]
    fn series_parser_extracts_season_and_episode() {
        let parsed = SeriesParser
            .parse("Show.Name.S02E05.Episode Title.mkv", Path::new("x"))
            .unwrap();
        assert_eq!(parsed.friendly_name, "S02E05 - Episode Title");
    }

    #[test]
    fn series_parser_rejects_unmatched_filename() {
        let err = SeriesParser.parse("random-file.mkv", Path::new("x")).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownFile(_)));
    }

    #[test]
    fn series_parse_forced_falls_back_to_loose_pattern() {
        let parsed = SeriesParser
            .parse_forced("Show 12 07 finale.mkv", Path::new("x"), &HashMap::new())
            .unwrap();
        assert_eq!(parsed.friendly_name, "S12E07 - finale");
    }

    #[test]
    fn parse_force_params_splits_key_value_pairs() {
        let params = parse_force_params("target_1080_crf=18:name=My Show").unwrap();
        assert_eq!(params.get("target_1080_crf"), Some(&"18".to_string()));
        assert_eq!(params.get("name"), Some(&"My Show".to_string()));
    }

    #[test]
    fn apply_overrides_rejects_unknown_key() {
        let mut options = EncodeOptions::default();
        let mut params = HashMap::new();
        params.insert("bogus".to_string(), "1".to_string());
        assert!(apply_overrides(&mut options, &params).is_err());
    }
}
