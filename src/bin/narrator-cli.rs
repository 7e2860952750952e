// src/bin/narrator-cli.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use narrator::config::Config;
use narrator::format::OutputFormat;
use narrator::orchestrator::{Orchestrator, RunOutcome, State};
use narrator::parser::PlainTextParser;
use narrator::process_backend::ProcessSynthesizer;
use narrator::voice::VoiceSynthesizer;

fn main() -> Result<()> {
    narrator::logging::init();

    let params = Params::parse();
    let config = build_config(&params)?;
    let backend: Arc<dyn VoiceSynthesizer> = Arc::new(ProcessSynthesizer::new(&params.tts_command));

    let orchestrator = Orchestrator::new(config, backend, params.tts_command.clone());

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks — {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    // Cooperative cancellation (spec.md §4.8, §5): a host embedding this
    // pipeline wires a signal handler to this flag. The CLI itself never
    // flips it, so a run only stops via normal completion or failure.
    let cancel = AtomicBool::new(false);

    let mut on_progress = |progress: narrator::progress::Progress| {
        bar.set_length(progress.chunks_total.max(1));
        bar.set_position(progress.chunks_completed);
        bar.set_message(format!("{:?}", progress.state));
    };

    let outcome = orchestrator
        .run(&params.input, &PlainTextParser, &cancel, Some(&mut on_progress))
        .context("narration run failed")?;

    match outcome {
        RunOutcome::Completed(path) => {
            bar.finish_with_message(format!("{:?}", State::Done));
            println!("{}", path.display());
        }
        RunOutcome::Cancelled => {
            bar.finish_with_message(format!("{:?}", State::Cancelled));
            println!("cancelled; re-run with the same options to resume");
        }
    }

    Ok(())
}

fn build_config(params: &Params) -> Result<Config> {
    let character_map: HashMap<String, String> = match &params.character_map {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read character map: {}", path.display()))?;
            serde_json::from_str(&raw).context("character map must be a JSON object of name -> voice id")?
        }
        None => HashMap::new(),
    };

    let config = Config {
        narrator_voice: params.narrator_voice.clone(),
        speed: params.speed,
        sample_rate: params.sample_rate,
        output_format: params.format,
        character_voices: params.character_voices,
        character_map,
        output_dir: params
            .output
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        workspace_dir: params.workspace_dir.clone(),
        ..Config::default()
    };
    Ok(config)
}

/// CLI parameters for `narrator`.
#[derive(Parser, Debug)]
#[command(name = "narrator")]
#[command(about = "Narrate a book-length text document into an audiobook")]
struct Params {
    /// Input document path.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output artifact path (its file extension is not inspected; use
    /// `--format` to pick the container).
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Default narrator voice id.
    #[arg(long = "narrator-voice", default_value = "am_michael")]
    narrator_voice: String,

    /// Speed multiplier passed to the backend, in [0.5, 2.0].
    #[arg(long = "speed", default_value_t = 1.0)]
    speed: f32,

    /// Output sample rate in Hz.
    #[arg(long = "sample-rate", default_value_t = 48_000)]
    sample_rate: u32,

    /// Output container format.
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Wav)]
    format: OutputFormat,

    /// Enable the Dialogue Router to voice detected characters separately
    /// from the narrator.
    #[arg(long = "character-voices", default_value_t = false)]
    character_voices: bool,

    /// Path to a JSON object mapping detected speaker name to voice id.
    #[arg(long = "character-map")]
    character_map: Option<PathBuf>,

    /// Scratch directory for the intermediate StreamFile and checkpoint
    /// slots. Resume is automatic whenever a prior run left a matching
    /// checkpoint under this directory.
    #[arg(long = "workspace-dir", default_value = "./.narrator-workspace")]
    workspace_dir: PathBuf,

    /// External TTS program implementing the `ProcessSynthesizer` wire
    /// protocol (see `narrator::process_backend`).
    #[arg(long = "tts-command")]
    tts_command: String,
}
