use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trim_engine::coords::format_timestamp;
use trim_engine::{ClipSession, EngineConfig, EngineError, TrimEdge, TrimJob, VideoAsset};

/// Trims one clip to `[--in, --out)` next to the original file.
#[derive(Parser, Debug)]
#[command(name = "cliptrim", version)]
struct Args {
    /// Clip to trim.
    input: PathBuf,

    /// In point in seconds.
    #[arg(long = "in", default_value_t = 0.0)]
    in_time: f64,

    /// Out point in seconds; defaults to the end of the clip.
    #[arg(long = "out")]
    out_time: Option<f64>,

    /// JSON engine config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Re-encode instead of copying streams.
    #[arg(long)]
    reencode: bool,

    /// Cancel the trim if it runs longer than this many seconds.
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Print the job record as JSON.
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(job) => {
            if args.json {
                print_json(&job);
            } else if let Some(asset) = &job.result_asset {
                print_summary(asset);
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("cliptrim: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: &Args) -> trim_engine::Result<TrimJob> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.reencode {
        config.stream_copy = false;
    }

    let mut session = ClipSession::with_ffmpeg(&config);
    let asset = session.import_path(&args.input)?;
    info!(
        path = %asset.path.display(),
        duration = %format_timestamp(asset.duration_seconds),
        "clip imported"
    );

    // Out first so a late in point is not clamped against the full clip.
    if let Some(out_time) = args.out_time {
        session.update_trim(TrimEdge::Out, out_time)?;
    }
    let range = session.update_trim(TrimEdge::In, args.in_time)?;
    info!(
        in_time = %format_timestamp(range.in_time()),
        out_time = %format_timestamp(range.out_time()),
        "trimming"
    );

    session.apply_trim()?;
    match session.wait_for_job(args.timeout) {
        Ok(_) => {}
        Err(EngineError::WaitTimedOut { job_id }) => {
            warn!(job_id, "trim timed out; cancelling");
            let job = session.cancel_job()?;
            return Err(EngineError::Cancelled { job_id: job.job_id });
        }
        Err(error) => return Err(error),
    }

    session
        .current_job()
        .cloned()
        .ok_or(EngineError::NoJobRunning)
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|error| format!("not a number of seconds: {error}"))?;
    if !(seconds > 0.0) {
        return Err("timeout must be positive".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|error| format!("timeout out of range: {error}"))
}

fn print_summary(asset: &VideoAsset) {
    println!(
        "{} ({}, {} bytes)",
        asset.path.display(),
        format_timestamp(asset.duration_seconds),
        asset.size_bytes
    );
}

fn print_json(job: &TrimJob) {
    match serde_json::to_string_pretty(job) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("cliptrim: failed to encode job record: {error}"),
    }
}
