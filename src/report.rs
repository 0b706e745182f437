//! Benchmark result reporting.

use crate::config::Config;
use crate::error::SubsetError;
use crate::extractor::ExtractionSummary;

use time::macros::format_description;
use time::OffsetDateTime;

/// Timing and outcome of one extraction run.
#[derive(Debug)]
pub struct RunReport<'a> {
    pub config: &'a Config,
    pub start: OffsetDateTime,
    pub stop: OffsetDateTime,
    pub summary: &'a ExtractionSummary,
    /// Collection manager calls issued during the run
    pub collection_calls: u64,
    /// Requests issued by store backends during the run
    pub store_requests: u64,
}

impl RunReport<'_> {
    /// Elapsed wall clock time in seconds.
    pub fn elapsed(&self) -> f64 {
        (self.stop - self.start).as_seconds_f64()
    }

    /// Returns the report as a line for inclusion in a benchmark CSV file.
    ///
    /// Columns: run number, start, stop, elapsed seconds, machine, input folder, output folder,
    /// input file, tracks extracted, tracks empty, tracks skipped, collection calls and store
    /// requests.
    pub fn csv_line(&self) -> Result<String, SubsetError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        Ok(format!(
            "{}, {}, {}, {:5.1}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            self.config.run_number,
            self.start.format(format)?,
            self.stop.format(format)?,
            self.elapsed(),
            self.config.machine,
            self.config.input_foldername,
            self.config.output_foldername,
            self.config.input_filename,
            self.summary.extracted(),
            self.summary.empty(),
            self.summary.skipped(),
            self.collection_calls,
            self.store_requests,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cli::CommandLineArgs;
    use crate::extractor::{TrackOutcome, TrackSummary};
    use crate::models::IndexRange;
    use clap::Parser;
    use time::macros::datetime;

    #[test]
    fn csv_line() {
        let mut args = CommandLineArgs::try_parse_from([
            "trackslice",
            "--input-foldername",
            "s3://granules/",
            "--input-filename",
            "ATL03",
            "--output-foldername",
            "out/",
            "--output-filename",
            "region",
            "--min-lon",
            "-1",
            "--max-lon",
            "1",
            "--min-lat",
            "15",
            "--max-lat",
            "35",
            "--machine",
            "m5.large",
            "--run-number",
            "3",
        ])
        .unwrap();
        args.aws_access_key_id = None;
        args.aws_secret_access_key = None;
        let config = Config::try_from(&args).unwrap();
        let summary = ExtractionSummary {
            tracks: vec![
                TrackSummary {
                    name: "gt1l".to_string(),
                    outcome: TrackOutcome::Extracted {
                        photon_range: IndexRange::new(1, 3),
                        count_range: IndexRange::new(2, 5),
                    },
                },
                TrackSummary {
                    name: "gt1r".to_string(),
                    outcome: TrackOutcome::Empty,
                },
            ],
            scalars_copied: 3,
        };
        let report = RunReport {
            config: &config,
            start: datetime!(2024-05-01 10:00:00 UTC),
            stop: datetime!(2024-05-01 10:00:12.34 UTC),
            summary: &summary,
            collection_calls: 17,
            store_requests: 42,
        };
        assert_eq!(
            "3, 2024-05-01 10:00:00, 2024-05-01 10:00:12,  12.3, m5.large, s3://granules/, out/, \
             ATL03, 1, 1, 0, 17, 42",
            report.csv_line().unwrap()
        );
    }
}
