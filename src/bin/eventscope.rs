use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tracing::{info, warn};

use eventscope::cache::Granularity;
use eventscope::config::Config;
use eventscope::pipeline::Pipeline;
use eventscope::report::{day_report, report_view};
use eventscope::scheduler::Scheduler;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "eventscope", version, about = "Windowed event summarization worker")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "eventscope.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler loop until ctrl-c (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Ingest events from a JSONL file into the event store
    Seed {
        /// File with one event JSON object per line (`-` for stdin)
        file: String,
    },
    /// Print the cached report for a standing key or a date document
    Report {
        /// Standing key (current | recent | today | yesterday) or a date (YYYY-MM-DD)
        target: String,
        /// Block granularity for date documents: coarse | detailed
        #[arg(long, default_value = "coarse")]
        granularity: String,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    init_parallelism();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    let interval = Duration::from_secs(cfg.scheduler.interval_secs);
    let pipeline = Pipeline::new(cfg)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let scheduler = Scheduler::new(interval);
            scheduler.install_signal_handler();
            scheduler.run(&pipeline);
        }
        Command::Once => {
            pipeline.run_cycle(chrono::Utc::now())?;
        }
        Command::Seed { file } => {
            seed(&pipeline, &file)?;
        }
        Command::Report { target, granularity } => {
            let granularity = if granularity == "detailed" {
                Granularity::Detailed
            } else {
                Granularity::Coarse
            };
            if target.len() == 10 && target.as_bytes()[4] == b'-' {
                let report = day_report(pipeline.cache(), &target, granularity)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match report_view(pipeline.cache(), &target)? {
                    Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
                    None => println!("{{}}"),
                }
            }
        }
    }
    Ok(())
}

fn seed(pipeline: &Pipeline, file: &str) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = if file == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(file)?))
    };
    let mut appended = 0usize;
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(body) => match pipeline.events().append(&body) {
                Ok(()) => appended += 1,
                Err(e) => {
                    warn!("skipping event: {e}");
                    skipped += 1;
                }
            },
            Err(e) => {
                warn!("skipping unparseable line: {e}");
                skipped += 1;
            }
        }
    }
    info!("seed finished - appended={appended}, skipped={skipped}");
    Ok(())
}
