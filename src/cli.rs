//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// Trackslice command line interface
///
/// Every option may also be given through the environment variable named next to it. Options on
/// the command line take precedence over the environment.
#[derive(Clone, Debug, Parser)]
#[command(version, about = "Extract a geographic region from a ground track array store")]
pub struct CommandLineArgs {
    /// Folder holding the input store. Must end with '/'
    #[arg(long, env = "TRACKSLICE_INPUT_FOLDERNAME")]
    pub input_foldername: String,
    /// Name of the input store within its folder
    #[arg(long, env = "TRACKSLICE_INPUT_FILENAME")]
    pub input_filename: String,
    /// Folder in which to create the output store. Must end with '/'
    #[arg(long, env = "TRACKSLICE_OUTPUT_FOLDERNAME")]
    pub output_foldername: String,
    /// Name of the output store within its folder
    #[arg(long, env = "TRACKSLICE_OUTPUT_FILENAME")]
    pub output_filename: String,
    /// Western edge of the bounding box in degrees
    #[arg(long, env = "TRACKSLICE_MIN_LON", allow_hyphen_values = true)]
    pub min_lon: f64,
    /// Eastern edge of the bounding box in degrees
    #[arg(long, env = "TRACKSLICE_MAX_LON", allow_hyphen_values = true)]
    pub max_lon: f64,
    /// Southern edge of the bounding box in degrees
    #[arg(long, env = "TRACKSLICE_MIN_LAT", allow_hyphen_values = true)]
    pub min_lat: f64,
    /// Northern edge of the bounding box in degrees
    #[arg(long, env = "TRACKSLICE_MAX_LAT", allow_hyphen_values = true)]
    pub max_lat: f64,
    /// Comma separated ground tracks to extract
    #[arg(
        long,
        default_value = "gt1l,gt1r,gt2l,gt2r,gt3l,gt3r",
        value_delimiter = ',',
        env = "TRACKSLICE_GROUND_TRACKS"
    )]
    pub ground_tracks: Vec<String>,
    /// Log level: DEBUG, INFO, WARNING or ERROR
    #[arg(long, default_value = "INFO", env = "TRACKSLICE_LOG_LEVEL")]
    pub log_level: String,
    /// File to write log output to instead of stdout
    #[arg(long, env = "TRACKSLICE_LOG_FILE")]
    pub log_file: Option<String>,
    /// AWS region of S3 and HTTP object storage
    #[arg(long, default_value = "us-west-2", env = "AWS_REGION")]
    pub aws_region: String,
    /// Object storage access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: Option<String>,
    /// Object storage secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,
    /// S3-compatible endpoint URL. Defaults to the AWS endpoint for the region
    #[arg(long, env = "TRACKSLICE_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
    /// Maximum number of concurrent remote requests
    #[arg(long, env = "TRACKSLICE_CONNECTION_LIMIT")]
    pub connection_limit: Option<usize>,
    /// Machine name recorded in the benchmark report
    #[arg(long, default_value = "unknown", env = "TRACKSLICE_MACHINE")]
    pub machine: String,
    /// Run number recorded in the benchmark report
    #[arg(long, default_value_t = 0, env = "TRACKSLICE_RUN_NUMBER")]
    pub run_number: u32,
    /// Whether to print Prometheus metrics after the run
    #[arg(long, default_value_t = false, env = "TRACKSLICE_PRINT_METRICS")]
    pub print_metrics: bool,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    fn required_args() -> Vec<&'static str> {
        vec![
            "trackslice",
            "--input-foldername",
            "data/",
            "--input-filename",
            "ATL03_20181017222812_02950102_005_01",
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
        ]
    }

    #[test]
    fn command_is_valid() {
        CommandLineArgs::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = CommandLineArgs::try_parse_from(required_args()).unwrap();
        assert_eq!(-1.0, args.min_lon);
        assert_eq!(35.0, args.max_lat);
        assert_eq!(
            vec!["gt1l", "gt1r", "gt2l", "gt2r", "gt3l", "gt3r"],
            args.ground_tracks
        );
        assert_eq!("INFO", args.log_level);
        assert_eq!(None, args.connection_limit);
        assert!(!args.print_metrics);
    }

    #[test]
    fn ground_tracks() {
        let mut argv = required_args();
        argv.extend(["--ground-tracks", "gt1l,gt3r", "--connection-limit", "8"]);
        let args = CommandLineArgs::try_parse_from(argv).unwrap();
        assert_eq!(vec!["gt1l", "gt3r"], args.ground_tracks);
        assert_eq!(Some(8), args.connection_limit);
    }

    #[test]
    fn missing_required() {
        assert!(CommandLineArgs::try_parse_from(["trackslice"]).is_err());
    }
}
