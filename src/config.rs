//! Run configuration.
//!
//! [Config] is built once from the command line and passed by reference to whatever needs it.

use crate::cli::CommandLineArgs;
use crate::error::SubsetError;
use crate::extractor::TrackLayout;
use crate::models::BoundingBox;
use crate::s3_client::S3Credentials;
use crate::store::StoreOptions;

use tracing::Level;
use url::Url;
use validator::Validate;

/// Validated configuration of an extraction run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Location of the input store
    pub input: String,
    /// Location of the output store
    pub output: String,
    /// Input folder, as given
    pub input_foldername: String,
    /// Output folder, as given
    pub output_foldername: String,
    /// Input store name, as given
    pub input_filename: String,
    /// Region to extract
    pub bbox: BoundingBox,
    /// Ground tracks and datasets to copy
    pub layout: TrackLayout,
    /// Maximum level of log events
    pub log_level: Level,
    /// Optional log file
    pub log_file: Option<String>,
    /// Options for remote stores
    pub store_options: StoreOptions,
    /// Machine name for the benchmark report
    pub machine: String,
    /// Run number for the benchmark report
    pub run_number: u32,
    /// Whether to print metrics after the run
    pub print_metrics: bool,
}

impl TryFrom<&CommandLineArgs> for Config {
    type Error = SubsetError;

    fn try_from(args: &CommandLineArgs) -> Result<Self, Self::Error> {
        let input = location("input_foldername", &args.input_foldername, &args.input_filename)?;
        let output = location(
            "output_foldername",
            &args.output_foldername,
            &args.output_filename,
        )?;
        let bbox = BoundingBox::new(args.min_lon, args.max_lon, args.min_lat, args.max_lat);
        bbox.validate()?;
        let ground_tracks: Vec<String> = args
            .ground_tracks
            .iter()
            .map(|track| track.trim().to_string())
            .filter(|track| !track.is_empty())
            .collect();
        if ground_tracks.is_empty() {
            return Err(SubsetError::InvalidConfig {
                key: "ground_tracks",
                reason: "at least one ground track is required".to_string(),
            });
        }
        let credentials = match (&args.aws_access_key_id, &args.aws_secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                S3Credentials::access_key(access_key, secret_key)
            }
            (None, None) => S3Credentials::None,
            _ => {
                return Err(SubsetError::InvalidConfig {
                    key: "aws_access_key_id",
                    reason: "access key and secret key must be given together".to_string(),
                })
            }
        };
        let s3_endpoint = args
            .s3_endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()?;
        if args.connection_limit == Some(0) {
            return Err(SubsetError::InvalidConfig {
                key: "connection_limit",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Config {
            input,
            output,
            input_foldername: args.input_foldername.clone(),
            output_foldername: args.output_foldername.clone(),
            input_filename: args.input_filename.clone(),
            bbox,
            layout: TrackLayout::with_ground_tracks(ground_tracks),
            log_level: parse_log_level(&args.log_level)?,
            log_file: args.log_file.clone(),
            store_options: StoreOptions {
                s3_endpoint,
                aws_region: args.aws_region.clone(),
                credentials,
                connection_limit: args.connection_limit,
            },
            machine: args.machine.clone(),
            run_number: args.run_number,
            print_metrics: args.print_metrics,
        })
    }
}

/// Join a folder and a file name. The folder must end with '/'.
fn location(key: &'static str, folder: &str, file: &str) -> Result<String, SubsetError> {
    if !folder.ends_with('/') {
        return Err(SubsetError::InvalidConfig {
            key,
            reason: format!("expected {} to end with '/'", folder),
        });
    }
    Ok(format!("{}{}", folder, file))
}

/// Parse a log level name. Names are case insensitive.
pub fn parse_log_level(level: &str) -> Result<Level, SubsetError> {
    match level.to_uppercase().as_str() {
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        _ => Err(SubsetError::InvalidConfig {
            key: "log_level",
            reason: format!(
                "{} is not one of DEBUG, INFO, WARNING, ERROR",
                level
            ),
        }),
    }
}
