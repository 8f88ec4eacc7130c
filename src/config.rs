//! Explicit runtime configuration for the cache.
//!
//! A [`CacheConfig`] is built once (usually with [`CacheConfig::from_env`] in
//! `main`) and then moved into the components that need it. Nothing else in
//! the library reads the process environment.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::host::Host;

/// Environment variable naming the local cache root.
pub const ROOT_ENV: &str = "SKYCACHE_DATA";

/// Environment variable naming the credential file.
pub const CREDENTIALS_ENV: &str = "SKYCACHE_CREDENTIALS";

/// Environment variable overriding the primary archive base URL.
pub const PRIMARY_URL_ENV: &str = "SKYCACHE_PRIMARY_URL";

/// Environment variable overriding the primary archive login endpoint.
pub const PRIMARY_LOGIN_URL_ENV: &str = "SKYCACHE_PRIMARY_LOGIN_URL";

/// Environment variable enabling the mirror host.
pub const MIRROR_URL_ENV: &str = "SKYCACHE_MIRROR_URL";

/// Cache root used when [`ROOT_ENV`] is unset.
pub const DEFAULT_ROOT: &str = "./Data/";

/// Credential file name under `$HOME` when [`CREDENTIALS_ENV`] is unset.
pub const DEFAULT_CREDENTIALS_FILE: &str = ".skycache";

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large products).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

const DEFAULT_PRIMARY_URL: &str = "https://irsa.ipac.caltech.edu/ibe/data/ztf/products/";
const DEFAULT_PRIMARY_LOGIN_URL: &str = "https://irsa.ipac.caltech.edu/account/signon/login.do";

/// Configuration errors. These are never swallowed: they terminate the
/// requesting operation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Host name outside the allowlist.
    #[error("unsupported host '{name}': expected one of {expected}")]
    UnsupportedHost {
        /// Name that was given.
        name: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// Host is in the allowlist but has no endpoint configured.
    #[error("host '{host}' has no base URL configured (set {env})")]
    HostNotConfigured {
        /// The host lacking an endpoint.
        host: Host,
        /// Environment variable that would configure it.
        env: &'static str,
    },

    /// Worker count outside the accepted range.
    #[error("invalid concurrency degree {value}: must be between 1 and {max}")]
    InvalidConcurrency {
        /// Value that was given.
        value: usize,
        /// Upper bound.
        max: usize,
    },

    /// Cutout mode was selected without a sky region.
    #[error("cutout requested for {url} but no region (center and size) was given")]
    MissingCutoutRegion {
        /// URL of the product the cutout was requested from.
        url: String,
    },

    /// A wait specification could not be parsed.
    #[error("invalid wait specification '{value}': {reason}")]
    InvalidWaitSpec {
        /// Raw value.
        value: String,
        /// What was wrong.
        reason: String,
    },

    /// A URL could not be parsed or joined.
    #[error("invalid URL '{value}'")]
    InvalidUrl {
        /// Raw value.
        value: String,
    },

    /// A logical identifier could not be mapped to a path.
    #[error("cannot resolve '{id}': {reason}")]
    UnresolvableId {
        /// The logical identifier.
        id: String,
        /// What was wrong.
        reason: String,
    },

    /// No home directory to place the default credential file in.
    #[error("unable to determine home directory (set {CREDENTIALS_ENV} or HOME)")]
    NoHomeDirectory,
}

impl ConfigError {
    /// Creates an unresolvable-identifier error.
    pub fn unresolvable(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-URL error.
    pub fn invalid_url(value: impl Into<String>) -> Self {
        Self::InvalidUrl {
            value: value.into(),
        }
    }
}

/// Network location of one allowlisted host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    /// Base URL that product paths are joined onto. Always ends with `/`.
    pub base_url: Url,
    /// Login endpoint for cookie-based authentication, if the host needs one.
    pub login_url: Option<Url>,
}

impl HostEndpoint {
    /// Builds an endpoint, normalising the base URL to end with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] when either URL fails to parse.
    pub fn parse(base_url: &str, login_url: Option<&str>) -> Result<Self, ConfigError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|_| ConfigError::invalid_url(base_url))?;
        let login_url = login_url
            .map(|raw| Url::parse(raw.trim()).map_err(|_| ConfigError::invalid_url(raw)))
            .transpose()?;
        Ok(Self {
            base_url,
            login_url,
        })
    }
}

/// Resolved configuration bundle threaded through the library.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    root: PathBuf,
    credentials_path: PathBuf,
    primary: HostEndpoint,
    mirror: Option<HostEndpoint>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
}

impl CacheConfig {
    /// Creates a configuration with built-in endpoints and explicit paths.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] only if the built-in endpoints are
    /// malformed.
    pub fn new(
        root: impl Into<PathBuf>,
        credentials_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            root: root.into(),
            credentials_path: credentials_path.into(),
            primary: HostEndpoint::parse(DEFAULT_PRIMARY_URL, Some(DEFAULT_PRIMARY_LOGIN_URL))?,
            mirror: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        })
    }

    /// Builds the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override URL is malformed or no
    /// credential path can be derived.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var_os(name))
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty or whitespace-only values are treated as unset.
    ///
    /// # Errors
    ///
    /// See [`CacheConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |name: &str| sanitize_env_value(lookup(name));

        let root = get(ROOT_ENV).map_or_else(|| PathBuf::from(DEFAULT_ROOT), PathBuf::from);
        let credentials_path = match get(CREDENTIALS_ENV) {
            Some(path) => PathBuf::from(path),
            None => get("HOME")
                .map(|home| PathBuf::from(home).join(DEFAULT_CREDENTIALS_FILE))
                .ok_or(ConfigError::NoHomeDirectory)?,
        };

        let mut config = Self::new(root, credentials_path)?;

        let primary_url = get(PRIMARY_URL_ENV);
        let primary_login = get(PRIMARY_LOGIN_URL_ENV);
        if primary_url.is_some() || primary_login.is_some() {
            config.primary = HostEndpoint::parse(
                primary_url.as_deref().unwrap_or(DEFAULT_PRIMARY_URL),
                Some(primary_login.as_deref().unwrap_or(DEFAULT_PRIMARY_LOGIN_URL)),
            )?;
        }
        if let Some(mirror) = get(MIRROR_URL_ENV) {
            config.mirror = Some(HostEndpoint::parse(&mirror, None)?);
        }

        debug!(
            root = %config.root.display(),
            credentials = %config.credentials_path.display(),
            mirror_enabled = config.mirror.is_some(),
            "resolved cache configuration"
        );
        Ok(config)
    }

    /// Overrides the cache root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Overrides the credential file location.
    #[must_use]
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    /// Overrides the endpoint of a host.
    #[must_use]
    pub fn with_endpoint(mut self, host: Host, endpoint: HostEndpoint) -> Self {
        match host {
            Host::Primary => self.primary = endpoint,
            Host::Mirror => self.mirror = Some(endpoint),
        }
        self
    }

    /// Overrides HTTP timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect_secs: u64, read_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.read_timeout_secs = read_secs;
        self
    }

    /// Local cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Credential file location.
    #[must_use]
    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// HTTP connect timeout in seconds.
    #[must_use]
    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    /// HTTP read timeout in seconds.
    #[must_use]
    pub fn read_timeout_secs(&self) -> u64 {
        self.read_timeout_secs
    }

    /// Primary host endpoint; always configured.
    #[must_use]
    pub fn primary_endpoint(&self) -> &HostEndpoint {
        &self.primary
    }

    /// Mirror endpoint, when enabled.
    #[must_use]
    pub fn mirror_endpoint(&self) -> Option<&HostEndpoint> {
        self.mirror.as_ref()
    }

    /// Returns the endpoint configured for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HostNotConfigured`] for the mirror when no
    /// mirror URL was provided.
    pub fn endpoint(&self, host: Host) -> Result<&HostEndpoint, ConfigError> {
        match host {
            Host::Primary => Ok(&self.primary),
            Host::Mirror => self.mirror.as_ref().ok_or(ConfigError::HostNotConfigured {
                host,
                env: MIRROR_URL_ENV,
            }),
        }
    }
}

fn sanitize_env_value(value: Option<OsString>) -> Option<String> {
    let value = value?;
    let value = value.to_string_lossy().trim().to_string();
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), OsString::from(*v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_defaults_root_and_credentials() {
        let config = CacheConfig::from_lookup(lookup_from(&[("HOME", "/home/astro")])).unwrap();
        assert_eq!(config.root(), Path::new(DEFAULT_ROOT));
        assert_eq!(
            config.credentials_path(),
            Path::new("/home/astro/.skycache")
        );
        assert!(config.endpoint(Host::Primary).unwrap().login_url.is_some());
    }

    #[test]
    fn test_from_lookup_respects_overrides() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            (ROOT_ENV, "/data/cache"),
            (CREDENTIALS_ENV, "/etc/skycache.ini"),
            (MIRROR_URL_ENV, "https://mirror.example.org/products"),
        ]))
        .unwrap();
        assert_eq!(config.root(), Path::new("/data/cache"));
        assert_eq!(config.credentials_path(), Path::new("/etc/skycache.ini"));
        let mirror = config.endpoint(Host::Mirror).unwrap();
        assert_eq!(
            mirror.base_url.as_str(),
            "https://mirror.example.org/products/"
        );
        assert!(mirror.login_url.is_none());
    }

    #[test]
    fn test_from_lookup_blank_values_are_unset() {
        let config =
            CacheConfig::from_lookup(lookup_from(&[(ROOT_ENV, "   "), ("HOME", "/h")])).unwrap();
        assert_eq!(config.root(), Path::new(DEFAULT_ROOT));
    }

    #[test]
    fn test_from_lookup_without_home_fails() {
        let result = CacheConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::NoHomeDirectory)));
    }

    #[test]
    fn test_mirror_unconfigured_is_config_error() {
        let config = CacheConfig::new("/tmp/x", "/tmp/creds").unwrap();
        let err = config.endpoint(Host::Mirror).unwrap_err();
        assert!(matches!(err, ConfigError::HostNotConfigured { .. }));
        assert!(err.to_string().contains(MIRROR_URL_ENV));
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        assert!(matches!(
            HostEndpoint::parse("not a url", None),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
