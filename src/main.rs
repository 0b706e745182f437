//! This file defines the trackslice binary entry point.

use std::process::ExitCode;

use time::OffsetDateTime;
use trackslice::cli;
use trackslice::config::Config;
use trackslice::error::{error_chain, SubsetError};
use trackslice::extractor::RegionExtractor;
use trackslice::metrics;
use trackslice::report::RunReport;
use trackslice::store::{open_store, OpenMode};
use trackslice::tracing;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    let config = match Config::try_from(&args) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("invalid configuration: {}", error_chain(&error).join(": "));
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = tracing::init_tracing(config.log_level, config.log_file.as_deref()) {
        eprintln!("failed to initialise logging: {}", error_chain(&error).join(": "));
        return ExitCode::FAILURE;
    }
    metrics::register_metrics();
    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            ::tracing::error!(error = %error_chain(&error).join(": "), "extraction failed");
            ExitCode::FAILURE
        }
    }
}

/// Extract the configured region and print the benchmark report.
async fn run(config: &Config) -> Result<(), SubsetError> {
    ::tracing::info!(input = %config.input, output = %config.output, "opening stores");
    let source = open_store(&config.input, OpenMode::Read, &config.store_options).await?;
    let destination = open_store(&config.output, OpenMode::Write, &config.store_options).await?;
    let start = OffsetDateTime::now_utc();
    let summary = RegionExtractor::new(
        source,
        destination,
        config.layout.clone(),
        config.bbox,
    )
    .run()
    .await?;
    let stop = OffsetDateTime::now_utc();
    let report = RunReport {
        config,
        start,
        stop,
        summary: &summary,
        collection_calls: metrics::collection_calls_total(),
        store_requests: metrics::store_requests_total(),
    };
    println!("{}", report.csv_line()?);
    if config.print_metrics {
        print!("{}", metrics::gather());
    }
    Ok(())
}
