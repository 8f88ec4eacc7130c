//! Error types for authentication.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadError;
use crate::host::Host;

/// Credential acquisition and validation failures. Never swallowed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The store has no entry and prompting is disabled.
    #[error("no credentials stored for '{service}' (run `skycache account {service}`)")]
    MissingCredentials {
        /// Service (host) name.
        service: String,
    },

    /// The host refused the credentials.
    #[error("login to {host} rejected: {reason}")]
    Rejected {
        /// Host that was logged into.
        host: Host,
        /// What the probe saw.
        reason: String,
    },

    /// The login request could not be completed.
    #[error("login request to {host} failed: {source}")]
    Transport {
        /// Host that was logged into.
        host: Host,
        /// The transfer failure.
        #[source]
        source: DownloadError,
    },

    /// The host needs a login endpoint that is not configured.
    #[error("host {host} has no login endpoint configured")]
    NoLoginEndpoint {
        /// Host lacking the endpoint.
        host: Host,
    },

    /// The credential file could not be read or written.
    #[error("credential store {path}: {source}")]
    Store {
        /// Credential file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The credential file is malformed.
    #[error("credential store {path} line {line}: {reason}")]
    Parse {
        /// Credential file.
        path: PathBuf,
        /// 1-based line number, 0 when not line-specific.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// Interactive input failed.
    #[error("credential prompt failed: {reason}")]
    Prompt {
        /// What went wrong.
        reason: String,
    },
}

impl AuthError {
    /// Creates a credential store I/O error.
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    /// Creates a credential store parse error.
    pub fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Creates a rejected-login error.
    pub fn rejected(host: Host, reason: impl Into<String>) -> Self {
        Self::Rejected {
            host,
            reason: reason.into(),
        }
    }
}
