//! Constants for the download module.

/// Write buffer size for streamed transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on worker count.
pub const MAX_CONCURRENCY: usize = 64;

/// Default cutout edge length in arcseconds.
pub const DEFAULT_CUTOUT_SIZE_ARCSEC: f64 = 30.0;

/// Requests per second used to derive a wait when an external executor gets
/// no explicit wait.
pub const DEFAULT_EXTERNAL_RATE: f64 = 100.0;

/// Extension of in-flight transfer files.
pub const PART_EXTENSION: &str = "part";
