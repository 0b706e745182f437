//! Error handling.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use ndarray::ShapeError;
use thiserror::Error;
use tokio::sync::AcquireError;

use crate::models::DType;

/// Region extraction error type
///
/// This type encapsulates the various errors that may occur while resolving index ranges,
/// driving collection operations or talking to an array store backend.
#[derive(Debug, Error)]
pub enum SubsetError {
    /// A coordinate or parallel array does not have the expected shape
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A collection call received a list whose length matches neither 1 nor the handle count
    #[error("{operation} expects 1 or {expected} items, got {actual}")]
    CountMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A path does not exist in the store
    #[error("{path} not found")]
    NotFound { path: String },

    /// A path already exists in the store
    #[error("{path} already exists")]
    AlreadyExists { path: String },

    /// A path refers to something other than a group
    #[error("{path} is not a group")]
    NotAGroup { path: String },

    /// A path refers to something other than a dataset
    #[error("{path} is not a dataset")]
    NotADataset { path: String },

    /// Element types of two arrays disagree
    #[error("data type mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// A selection has more slices than the array has dimensions
    #[error("selection with {selection} slices applied to array of rank {rank}")]
    SelectionRank { selection: usize, rank: usize },

    /// An index range ends before it starts
    #[error("index range {min}:{max} is inverted")]
    InvalidRange { min: usize, max: usize },

    /// A per-segment count is negative or not representable
    #[error("invalid segment count {value}")]
    InvalidCount { value: String },

    /// Error validating a model object
    #[error("validation failed")]
    Validation(#[from] validator::ValidationErrors),

    /// Invalid configuration value
    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    /// Write access requested for a read-only backend
    #[error("{location} can only be opened for reading")]
    ReadOnly { location: String },

    /// No backend is available for the location
    #[error("unsupported store location {location}")]
    UnsupportedLocation { location: String },

    /// Error converting from bytes to a type
    #[error("failed to convert from bytes to {type_name}")]
    FromBytes { type_name: &'static str },

    /// Error creating an ndarray from a shape or slice
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Local I/O error
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error (de)serialising a layout document
    #[error("invalid layout document")]
    Json(#[from] serde_json::Error),

    /// Error parsing a location URL
    #[error("invalid URL")]
    Url(#[from] url::ParseError),

    /// Error reading object data from S3
    #[error("error receiving object from S3 storage")]
    S3ByteStream(#[from] ByteStreamError),

    /// Missing Content-Length header in S3 response.
    #[error("S3 response missing Content-Length header")]
    S3ContentLengthMissing,

    /// Error while retrieving an object from S3
    #[error("error retrieving object from S3 storage")]
    S3GetObject(#[from] SdkError<GetObjectError>),

    /// Error while talking to an HTTP server
    #[error("error retrieving object over HTTP")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP response status
    #[error("HTTP request for {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Error formatting a timestamp
    #[error("failed to format timestamp")]
    TimeFormat(#[from] time::error::Format),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquire(#[from] AcquireError),
}

impl SubsetError {
    /// Whether the error only invalidates the ground track being processed.
    ///
    /// The extractor logs such errors, skips the track and carries on with the next one.
    pub fn is_track_local(&self) -> bool {
        matches!(self, SubsetError::ShapeMismatch { .. })
    }
}

/// Returns the message of an error followed by the messages of its sources.
///
/// Consecutive duplicates are removed, since wrapped errors often repeat their inner message.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut current = error.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain.dedup();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subset_error(error: SubsetError, message: &str, caused_by: Vec<&str>) {
        let mut expected = vec![message.to_string()];
        expected.extend(caused_by.iter().map(|s| s.to_string()));
        assert_eq!(expected, error_chain(&error));
    }

    #[test]
    fn shape_mismatch() {
        let error = SubsetError::ShapeMismatch {
            what: "gt1l reference coordinates".to_string(),
            expected: vec![4],
            actual: vec![3],
        };
        let message = "shape mismatch for gt1l reference coordinates: expected [4], got [3]";
        assert!(error.is_track_local());
        test_subset_error(error, message, vec![]);
    }

    #[test]
    fn count_mismatch() {
        let error = SubsetError::CountMismatch {
            operation: "create_groups",
            expected: 3,
            actual: 2,
        };
        assert!(!error.is_track_local());
        test_subset_error(error, "create_groups expects 1 or 3 items, got 2", vec![]);
    }

    #[test]
    fn not_found() {
        let error = SubsetError::NotFound {
            path: "/gt1l/heights/h_ph".to_string(),
        };
        test_subset_error(error, "/gt1l/heights/h_ph not found", vec![]);
    }

    #[test]
    fn dtype_mismatch() {
        let error = SubsetError::DTypeMismatch {
            expected: DType::Float64,
            actual: DType::Int8,
        };
        test_subset_error(error, "data type mismatch: expected Float64, got Int8", vec![]);
    }

    #[test]
    fn validation() {
        let mut validation_errors = validator::ValidationErrors::new();
        validation_errors.add("min_lat", validator::ValidationError::new("range"));
        let error = SubsetError::Validation(validation_errors);
        test_subset_error(
            error,
            "validation failed",
            vec!["min_lat: Validation error: range [{}]"],
        );
    }

    #[test]
    fn io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = SubsetError::Io(io_error);
        test_subset_error(error, "I/O error", vec!["no such file"]);
    }

    #[test]
    fn shape_error() {
        let error = SubsetError::ShapeInvalid(ShapeError::from_kind(
            ndarray::ErrorKind::OutOfBounds,
        ));
        test_subset_error(
            error,
            "failed to create array from shape",
            vec!["ShapeError/OutOfBounds: out of bounds indexing"],
        );
    }

    #[test]
    fn try_from_int_error() {
        let error = SubsetError::TryFromInt(u8::try_from(-1_i8).unwrap_err());
        test_subset_error(error, "out of range integral type conversion attempted", vec![]);
    }

    #[test]
    fn s3_byte_stream_error() {
        // ByteStreamError provides a From impl for std::io:Error.
        let error = SubsetError::S3ByteStream(
            std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into(),
        );
        test_subset_error(
            error,
            "error receiving object from S3 storage",
            vec!["IO error", "unexpected end of file"],
        );
    }

    #[tokio::test]
    async fn semaphore_acquire_error() {
        let sem = tokio::sync::Semaphore::new(1);
        sem.close();
        let error = SubsetError::SemaphoreAcquire(sem.acquire().await.unwrap_err());
        test_subset_error(error, "error acquiring resources", vec!["semaphore closed"]);
    }
}
