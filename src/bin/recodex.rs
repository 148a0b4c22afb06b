//! CLI entry point. Wires [`recodex::cli::Cli`] parsing, logging/config
//! init, ingestion of new sources into the persisted task graph, and the
//! [`recodex::executor::Executor`] run loop (spec.md 6).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Parser;

use recodex::cli::Cli;
use recodex::config::AppSettings;
use recodex::encoder::ToolPaths;
use recodex::error::SchedulerError;
use recodex::executor::Executor;
use recodex::locked_state::LockedState;
use recodex::media::descriptor::MediaDescriptor;
use recodex::media::parser::{parse_force_params, MediaParser, ParsedMedia};
use recodex::media::probe::{MediaProbe, MkvmergeProbe};
use recodex::media::registry::MediaRegistry;
use recodex::media::{self, interactive::InteractiveSelector};
use recodex::task::graph::Batch;

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(&cli).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        err.downcast_ref::<SchedulerError>()
            .map(SchedulerError::exit_code)
            .unwrap_or(1)
    }));
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let log_path = cli.resolve_log_path();
    recodex::logging::init(cli.debug, log_path.as_deref())?;

    if cli.list_params {
        print_parameter_help();
        return Ok(0);
    }

    let config_path = PathBuf::from(&cli.dest).join("recodex.json");
    let settings = if cli.dest.is_empty() {
        AppSettings::default()
    } else {
        AppSettings::load(&config_path)?
    };
    let tools = ToolPaths::resolve(&settings.tools)?;

    let state_path = cli
        .resolve_state_path()
        .ok_or_else(|| anyhow::anyhow!("either --state or --dest must be set"))?;
    let locked_state = LockedState::new(state_path.clone());

    if !cli.resume {
        ingest(cli, &state_path, &locked_state, tools.clone())?;
    }

    if cli.nostart {
        log::info!("--nostart given, state file written, exiting without dispatching work");
        return Ok(0);
    }

    let executor = Executor::<recodex::encoder::EncoderTask>::with_update_delay(
        locked_state,
        cli.scriptize,
        std::time::Duration::from_secs(settings.update_delay_secs),
    )?;
    executor.run()?;
    Ok(0)
}

fn parsers() -> Vec<Box<dyn MediaParser>> {
    vec![
        Box::new(media::parser::SeriesParser),
        Box::new(media::parser::MovieParser),
    ]
}

fn ingest(
    cli: &Cli,
    state_path: &Path,
    locked_state: &LockedState,
    tools: ToolPaths,
) -> anyhow::Result<()> {
    if cli.source.is_empty() {
        return Ok(());
    }

    let params = parse_force_params(&cli.force_params)?;
    let probe = MkvmergeProbe {
        mkvmerge_path: tools.mkvmerge.clone(),
    };
    let registry_path = MediaRegistry::sibling_path(state_path);
    let mut registry = MediaRegistry::load(&registry_path)?;
    let mut selector = recodex::media::interactive::StdioSelector;

    for source in &cli.source {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let parsed = parse_one(cli, &file_name, source, &params)?;
        let descriptor = probe.probe(source)?;

        let ignored_audio_tracks = if cli.interactive && !descriptor.audio_tracks.is_empty() {
            select_ignored_tracks(&mut selector, &descriptor)
        } else {
            HashSet::new()
        };

        registry.insert(parsed.media_key.clone(), descriptor.clone());

        let dest = PathBuf::from(&cli.dest);
        let batch_tasks = media::build_batch(
            &parsed,
            &descriptor,
            source,
            &dest,
            tools.clone(),
            &ignored_audio_tracks,
        );
        let batch = Batch::new(batch_tasks.into_iter().map(Some).collect());

        let scope = locked_state.lock()?;
        scope.append_batch(batch)?;
    }

    registry.save(&registry_path)?;
    Ok(())
}

fn parse_one(
    cli: &Cli,
    file_name: &str,
    source: &Path,
    params: &std::collections::HashMap<String, String>,
) -> anyhow::Result<ParsedMedia> {
    if let Some(force_type) = &cli.force_type {
        for parser in parsers() {
            if parser.force_name() == force_type {
                return Ok(parser.parse_forced(file_name, source, params)?);
            }
        }
        anyhow::bail!("unknown --force-type: {force_type}");
    }
    for parser in parsers() {
        match parser.parse(file_name, source) {
            Ok(parsed) => return Ok(parsed),
            Err(SchedulerError::UnknownFile(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(SchedulerError::UnknownFile(file_name.to_string()).into())
}

fn select_ignored_tracks(
    selector: &mut impl InteractiveSelector,
    descriptor: &MediaDescriptor,
) -> HashSet<u32> {
    let ids: Vec<u32> = descriptor.audio_tracks.iter().map(|t| t.track_id).collect();
    if ids.is_empty() {
        return HashSet::new();
    }
    let min = *ids.iter().min().unwrap();
    let max = *ids.iter().max().unwrap();
    loop {
        let kept: HashSet<u32> = selector
            .select_numbers("Which audio tracks to keep?", min..=max)
            .into_iter()
            .collect();
        println!("Tracks to keep:");
        for track in &descriptor.audio_tracks {
            if kept.contains(&track.track_id) {
                println!("  [{}] {} ({} channels)", track.language, track.name, track.channels);
            }
        }
        if selector.confirm("Are tracks selected correctly?", true) {
            return ids.into_iter().filter(|id| !kept.contains(id)).collect();
        }
    }
}

fn print_parameter_help() {
    for parser in parsers() {
        println!("--force-type {}", parser.force_name());
        for param in parser.describe_parameters() {
            println!("  {}: {}", param.key, param.help);
        }
    }
}
