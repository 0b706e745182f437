//! This crate extracts a geographic region from satellite altimetry data organised by ground
//! track, and writes it to a new store with the same structure.
//!
//! Each ground track group holds reference segment coordinates, a photon count per segment and
//! a set of per-photon arrays. Extraction has two parts:
//!
//! * [range_finder] resolves the contiguous range of segments inside a bounding box, without
//!   assuming the coordinates are sorted, and converts it into the range of photons covered.
//! * [collection] addresses a set of parallel groups or datasets as a single handle, so that
//!   every step of an extraction is issued as one batched call to the [store].
//!
//! Stores may be local directories, in-process memory, or remote objects served by S3 or over
//! HTTP. Remote stores issue the requests of a batched call concurrently, so the number of
//! round trips does not grow with the number of ground tracks.
//!
//! The crate is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Serde](serde) performs (de)serialisation of store layout documents.
//! * [AWS SDK for S3](aws-sdk-s3) is used to interact with S3-compatible object stores.
//! * [reqwest] performs ranged HTTP requests.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used for selections.

pub mod array;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod models;
pub mod range_finder;
pub mod report;
pub mod resource_manager;
pub mod s3_client;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
