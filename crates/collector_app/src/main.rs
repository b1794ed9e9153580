mod cli;

use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use collector_engine::{
    ensure_output_dir, ChannelProgressSink, CrawlReport, Engine, EngineEvent, PersistingResolver,
    ReqwestFetcher,
};
use collector_logging::{collector_error, collector_info, collector_warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    collector_logging::initialize(cli.log_destination(), cli.log_level());

    match run(&cli) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            collector_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<CrawlReport> {
    ensure_output_dir(&cli.output)
        .with_context(|| format!("cannot use output directory {:?}", cli.output))?;

    let fetcher = Arc::new(ReqwestFetcher::new(cli.fetch_settings()));
    let resolver = Arc::new(PersistingResolver::new(cli.output.clone()));
    let (event_tx, event_rx) = mpsc::channel();

    let engine = Engine::new(cli.seed.as_str(), cli.engine_config(), fetcher, resolver)
        .context("invalid crawl settings")?
        .with_progress_sink(Arc::new(ChannelProgressSink::new(event_tx)));

    // Ends when the engine, and with it the sink, is dropped.
    let printer = thread::spawn(move || {
        for event in event_rx {
            print_event(&event);
        }
    });

    collector_info!("Collecting from {} into {:?}", cli.seed, cli.output);
    let report = engine.run_blocking().context("crawl could not start")?;
    join_printer(printer);
    Ok(report)
}

/// Returns `false` if the printer thread panicked.
fn join_printer(printer: thread::JoinHandle<()>) -> bool {
    if printer.join().is_err() {
        collector_warn!("Progress printer thread panicked; some events were not shown");
        return false;
    }
    true
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Fetched {
            location,
            depth,
            bytes,
        } => println!("  fetched [depth {depth}] {location} ({bytes} bytes)"),
        EngineEvent::FetchFailed { address, error } => {
            println!("  failed  [depth {}] {}: {}", address.depth, address.location, error)
        }
        EngineEvent::Rejected { address, reason } => {
            println!("  skipped [depth {}] {}: {:?}", address.depth, address.location, reason)
        }
        _ => {}
    }
}

fn print_report(report: &CrawlReport) {
    println!();
    println!("Summary:");
    println!("  fetched:          {}", report.fetched);
    println!("  fetch failures:   {}", report.fetch_failures);
    println!("  over max depth:   {}", report.rejected_depth);
    println!("  over fetch limit: {}", report.rejected_limit);
    println!("  followed:         {}", report.resolved);
    println!("  saved, no follow: {}", report.terminal);
    println!("  resolve failures: {}", report.resolve_failures);
    let dropped = report.dropped_contents + report.dropped_addresses;
    if dropped > 0 {
        println!("  dropped at stop:  {dropped}");
    }
}
