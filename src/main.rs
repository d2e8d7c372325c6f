use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use narration_sync::config::EngineConfig;
use narration_sync::engines::espeak::EspeakEngine;
use narration_sync::layout::FontdueBackend;
use narration_sync::pipeline::{Pipeline, RenderJob};

#[derive(Parser, Debug)]
#[command(
    name = "narration-sync",
    version,
    about = "Synthesize narration, timing files and subtitle frames for a scripted lesson"
)]
struct Args {
    /// Job file: project, identifier, scenes and frame templates
    #[arg(short, long)]
    job: PathBuf,

    /// Engine config file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the output root from the config
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bundled espeak-ng binary
    #[arg(long)]
    espeak_bin: Option<PathBuf>,

    /// Bundled espeak-ng data directory
    #[arg(long)]
    espeak_data: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long, default_value_t = false)]
    report_json: bool,
}

fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(output) = args.output {
        config.output_root = output;
    }
    let job = RenderJob::from_json_file(&args.job)?;

    let backend = FontdueBackend::new(&config.layout.fonts_dir);
    let engine = EspeakEngine::with_espeak(args.espeak_bin, args.espeak_data);
    let mut pipeline = Pipeline::new(config, engine, backend);

    let start = Instant::now();
    let report = pipeline.run(&job)?;
    log::info!("Finished in {:.2?}", start.elapsed());

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    for failure in &report.failures {
        eprintln!("error: {failure}");
    }
    for name in &report.naming_mismatches {
        eprintln!("warning: no frame rendered for {name}");
    }
    Ok(report.is_success())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
