//! Fetching archive products to the local cache.
//!
//! # Features
//!
//! - Streaming transfers written through a `.part` file and renamed into place
//! - Cache short-circuit for existing destinations
//! - Cutout requests and form-encoded POST payloads
//! - Post-fetch integrity verification with optional erase
//! - Batch dispatch: sequential, worker pool, shared pool or external executor
//!
//! # Example
//!
//! ```no_run
//! use skycache_core::auth::Session;
//! use skycache_core::download::{Concurrency, DownloadOrchestrator, DownloadTask, Fetcher};
//! use skycache_core::host::Host;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let base = Url::parse("https://archive.example.org/")?;
//! let session = Session::new(Host::Primary, base.clone(), 30, 300)?;
//! let task = DownloadTask::new(base.join("sci/a_sciimg.fits")?, "./Data/sci/a_sciimg.fits");
//! let batch = DownloadOrchestrator::new(Fetcher::default())
//!     .run(vec![task], &session, &Concurrency::Workers(4))
//!     .await?;
//! println!("written: {}", batch.written());
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod task;
mod wait;

pub use client::{Fetcher, part_path};
pub(crate) use client::build_client;
pub use constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CUTOUT_SIZE_ARCSEC, DEFAULT_EXTERNAL_RATE, MAX_CONCURRENCY,
    PART_EXTENSION,
};
pub use engine::{
    BatchReport, Concurrency, DownloadOrchestrator, EngineError, FetchJob, JoinSetExecutor,
    MIN_CONCURRENCY, ProgressSink, TaskExecutor, WorkerPool,
};
pub use error::{DownloadError, FetchError};
pub use task::{
    CutoutRequest, DownloadTask, FetchOptions, FetchOutcome, FetchReport, SkyRegion,
};
pub use wait::{WaitPolicy, WaitSpec};
