//! silkpatch - Tidy KiCad silkscreen text and fetch the JLCPCB parts database

use silkpatch::{
    config::{Config, FetchConfig, NormalizeConfig, Task},
    error::Result,
    fetch::Fetcher,
    normalizer::Normalizer,
    progress::ProgressTracker,
};
use tracing::{error, info};

fn main() -> Result<()> {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    let progress_tracker = ProgressTracker::new(!config.no_progress);

    let outcome = match config.task {
        Task::Normalize(normalize) => run_normalize(normalize, progress_tracker),
        Task::FetchParts(fetch) => run_fetch(&fetch, progress_tracker),
    };

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_normalize(config: NormalizeConfig, progress_tracker: ProgressTracker) -> Result<bool> {
    let check = config.check;
    let report = Normalizer::new(config, progress_tracker).run()?;

    for path in report.modified() {
        if check {
            println!("would change: {}", path.display());
        } else {
            println!("normalized: {}", path.display());
        }
    }
    for (path, reason) in report.failed() {
        eprintln!("failed: {}: {}", path.display(), reason);
    }

    println!(
        "{} layout files, {} {}, {} failed",
        report.outcomes.len(),
        report.modified().len(),
        if check { "would change" } else { "modified" },
        report.failed().len()
    );

    Ok(report.is_success())
}

fn run_fetch(config: &FetchConfig, progress_tracker: ProgressTracker) -> Result<bool> {
    let fetcher = Fetcher::from_config(config, progress_tracker)?;
    let report = fetcher.run()?;

    if report.skipped {
        println!(
            "Parts database {} is up to date (use --force to download anyway)",
            fetcher.plan().database_path().display()
        );
    } else {
        info!("Fetched {} files", report.transfers.len());
        println!(
            "Downloaded {} files ({} bytes) and extracted {}",
            report.transfers.len(),
            report.bytes_downloaded(),
            fetcher.plan().archive_path().display()
        );
    }

    Ok(true)
}
