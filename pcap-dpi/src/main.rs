#![warn(clippy::all)]

#[macro_use]
extern crate log;

use clap::{crate_version, Parser};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use libpcap_dpi::*;
use libpcap_tools::Config;

/// Pcap file deep packet inspection tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<String>,

    /// Block rules file (TOML)
    #[arg(short, long, value_name = "RULES")]
    rules: Option<String>,

    /// Write the JSON result to this file (default: standard output)
    #[arg(short, long, value_name = "RESULT")]
    output: Option<String>,

    /// Write a copy of the input without blocked packets
    #[arg(short, long, value_name = "FILTERED")]
    export: Option<String>,

    /// Maximum number of per-packet summaries in the result
    #[arg(short = 'l', long, value_name = "LIMIT")]
    packet_limit: Option<u32>,

    /// Log directory
    #[arg(long)]
    outdir: Option<String>,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Input file ('-' for standard input)
    input: String,
}

fn config_error(e: libpcap_tools::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn analysis_error(e: AnalysisError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

fn load_config(config: &mut Config, filename: &str) -> Result<(), io::Error> {
    debug!("Loading configuration {filename}");
    let path = Path::new(&filename);
    let file = File::open(path)?;
    config.load_config(file).map_err(config_error)
}

fn load_rules(store: &MemoryRuleStore, filename: &str) -> Result<(), io::Error> {
    let file = File::open(filename)?;
    let n = store.load(file).map_err(analysis_error)?;
    info!("Loaded {n} rules from {filename}");
    Ok(())
}

fn write_result(result: &AnalysisResult, output: Option<&str>) -> Result<(), io::Error> {
    match output {
        Some(filename) => {
            let mut w = BufWriter::new(File::create(filename)?);
            serde_json::to_writer_pretty(&mut w, result)?;
            w.flush()?;
            info!("Result written to {filename}");
        }
        None => {
            let stdout = io::stdout();
            let mut w = stdout.lock();
            serde_json::to_writer_pretty(&mut w, result)?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    if args.export.is_some() && args.input == "-" {
        // export reads the input a second time
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot export a capture read from standard input",
        ));
    }

    // load config
    let mut config = Config::default();
    if let Some(filename) = args.config.as_ref() {
        load_config(&mut config, filename)?;
    }
    // override config options from command-line arguments
    if let Some(dir) = args.outdir.as_ref() {
        config.set("output_dir", dir.as_str());
    }
    if let Some(limit) = args.packet_limit {
        config.set("packet_summary_limit", i64::from(limit));
    }
    if let Some(rules) = args.rules.as_ref() {
        config.set("rules_file", rules.as_str());
    }

    // Open log file
    let log_file = config.get("log_file").unwrap_or("pcap-dpi.log");
    let output_dir = config.get("output_dir").unwrap_or(".");
    let file_appender = RollingFileAppender::new(Rotation::NEVER, output_dir, log_file);
    let default_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_env("PCAP_DPI_LOG")
        .unwrap_or_else(|_| EnvFilter::from_default_env().add_directive(default_level.into()));
    tracing_subscriber::fmt()
        .with_writer(file_appender)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .compact()
        .init();

    info!("Pcap DPI {}", crate_version!());

    let rule_store = Arc::new(MemoryRuleStore::new());
    if let Some(filename) = config.get("rules_file") {
        load_rules(&rule_store, filename)?;
    }
    let result_store = Arc::new(MemoryResultStore::new());

    let capacity = config.get_usize("progress_channel_capacity").unwrap_or(64);
    let (progress, events) = progress_channel(capacity);
    let pipeline = Pipeline::new(rule_store, result_store.clone())
        .with_options(AnalyzerOptions::from_config(&config))
        .with_progress(progress);

    let handle = pipeline.submit(&args.input).map_err(analysis_error)?;
    let token = handle.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("Could not install Ctrl-C handler: {e}");
    }

    // print progress while the run executes
    let print_event = |ev: ProgressEvent| {
        eprintln!("[{:>3}%] {}: {}", ev.progress, ev.status, ev.message);
    };
    while !handle.is_finished() {
        if let Ok(ev) = events.recv_timeout(Duration::from_millis(100)) {
            print_event(ev);
        }
    }
    let run_id = handle.run_id;
    let status = handle.join();
    events.try_iter().for_each(print_event);

    let result = result_store
        .get(run_id)
        .ok_or_else(|| analysis_error(AnalysisError::UnknownRun(run_id)))?;
    if status != RunStatus::Completed {
        let msg = result.error.unwrap_or_else(|| status.to_string());
        error!("Analysis of {} failed: {msg}", args.input);
        return Err(io::Error::new(io::ErrorKind::Other, msg));
    }
    write_result(&result, args.output.as_deref())?;

    if let Some(filename) = args.export.as_ref() {
        let stats = pipeline
            .export(&args.input, filename)
            .map_err(analysis_error)?;
        info!(
            "Export: {} forwarded, {} dropped, {} unparsed",
            stats.forwarded, stats.dropped, stats.unparsed
        );
        eprintln!(
            "Filtered capture written to {filename} ({} of {} packets)",
            stats.forwarded, stats.total
        );
    }

    info!("pcap-dpi: done, exiting");
    Ok(())
}
