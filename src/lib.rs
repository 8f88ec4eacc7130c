//! Skycache Core Library
//!
//! Fetches science data products from a remote archive into a local cache,
//! decides what needs fetching, and keeps the cache trustworthy through
//! integrity checks and remediation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Explicit configuration (cache root, credential file, hosts)
//! - [`host`] - The closed allowlist of remote hosts
//! - [`naming`] - Logical id to local path / remote URL mapping
//! - [`auth`] - Credential store and authenticated sessions
//! - [`integrity`] - Hashing, verification records and format tests
//! - [`cache`] - Download decisions and local file discovery
//! - [`download`] - Fetcher and batch orchestration
//! - [`remediation`] - Handling of corrupt files
//! - [`archive`] - The high-level facade tying everything together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod auth;
pub mod cache;
pub mod config;
pub mod download;
pub mod host;
pub mod integrity;
pub mod naming;
pub mod remediation;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use archive::{
    Archive, ArchiveError, CacheCheckReport, CheckOptions, GetOptions, GetReport, MissingPolicy,
};
pub use auth::{AuthError, Credentials, IniCredentialStore, Session, SessionManager};
pub use cache::{CacheDecider, find_local_files};
pub use config::{CacheConfig, ConfigError};
pub use download::{
    BatchReport, Concurrency, DownloadOrchestrator, DownloadTask, FetchOutcome, Fetcher,
    WaitPolicy, WaitSpec,
};
pub use host::Host;
pub use integrity::{IntegrityChecker, IntegrityVerdict};
pub use naming::{FileRequest, NamingResolver};
pub use remediation::{CorruptionReport, RemediationPolicy, Remediator};
