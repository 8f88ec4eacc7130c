//! Mapping between logical product identifiers, remote URLs and local paths.
//!
//! A logical identifier is the product's relative path inside the archive
//! (e.g. `sci/2018/0221/328009/ztf_20180221328009_000671_zg_c03_o_q1_sciimg.fits`).
//! The same relative path is used under the configured base URL of a host and
//! under the local cache root, which makes the mapping reversible.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::config::{CacheConfig, ConfigError, HostEndpoint};
use crate::host::Host;

/// A request for one archive product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Relative product path inside the archive.
    pub logical_id: String,
    /// Optional replacement for the product-type suffix of the file name.
    pub suffix: Option<String>,
    /// Host to fetch from.
    pub host: Host,
}

impl FileRequest {
    /// Creates a request for `logical_id` on the primary host.
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            suffix: None,
            host: Host::Primary,
        }
    }

    /// Sets the product-type suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }
}

/// Where a request lives remotely and locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Remote URL of the product.
    pub remote_url: Url,
    /// Local cache path of the product.
    pub local_path: PathBuf,
}

/// Deterministic naming scheme. Both directions must be pure functions of
/// their inputs.
pub trait NamingResolver: Send + Sync + fmt::Debug {
    /// Local cache path for a logical id under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnresolvableId`] for malformed identifiers.
    fn local_path(
        &self,
        logical_id: &str,
        suffix: Option<&str>,
        root: &Path,
    ) -> Result<PathBuf, ConfigError>;

    /// Remote URL for a logical id on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed identifiers or unconfigured hosts.
    fn remote_url(
        &self,
        logical_id: &str,
        suffix: Option<&str>,
        host: Host,
    ) -> Result<Url, ConfigError>;

    /// Recovers the remote URL and host a cached file came from, if known.
    fn reverse(&self, local_path: &Path, root: &Path) -> Option<(Url, Host)>;

    /// Resolves both locations of a request.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`NamingResolver::local_path`] and
    /// [`NamingResolver::remote_url`].
    fn resolve(&self, request: &FileRequest, root: &Path) -> Result<ResolvedLocation, ConfigError> {
        let suffix = request.suffix.as_deref();
        Ok(ResolvedLocation {
            remote_url: self.remote_url(&request.logical_id, suffix, request.host)?,
            local_path: self.local_path(&request.logical_id, suffix, root)?,
        })
    }
}

/// Resolver that mirrors the archive's directory layout under the cache root.
#[derive(Debug, Clone)]
pub struct MirrorLayout {
    primary: HostEndpoint,
    mirror: Option<HostEndpoint>,
}

impl MirrorLayout {
    /// Builds the layout from the configured host endpoints.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            primary: config.primary_endpoint().clone(),
            mirror: config.mirror_endpoint().cloned(),
        }
    }

    fn endpoint(&self, host: Host) -> Result<&HostEndpoint, ConfigError> {
        match host {
            Host::Primary => Ok(&self.primary),
            Host::Mirror => self.mirror.as_ref().ok_or(ConfigError::HostNotConfigured {
                host,
                env: crate::config::MIRROR_URL_ENV,
            }),
        }
    }
}

impl NamingResolver for MirrorLayout {
    fn local_path(
        &self,
        logical_id: &str,
        suffix: Option<&str>,
        root: &Path,
    ) -> Result<PathBuf, ConfigError> {
        let relative = relative_path(logical_id, suffix)?;
        Ok(root.join(relative))
    }

    fn remote_url(
        &self,
        logical_id: &str,
        suffix: Option<&str>,
        host: Host,
    ) -> Result<Url, ConfigError> {
        let relative = relative_path(logical_id, suffix)?;
        let endpoint = self.endpoint(host)?;
        let joined = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/");
        endpoint
            .base_url
            .join(&joined)
            .map_err(|_| ConfigError::invalid_url(format!("{}{joined}", endpoint.base_url)))
    }

    fn reverse(&self, local_path: &Path, root: &Path) -> Option<(Url, Host)> {
        let relative = local_path.strip_prefix(root).ok()?;
        let id = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?
            .join("/");
        let url = self.remote_url(&id, None, Host::Primary).ok()?;
        Some((url, Host::Primary))
    }
}

/// Validates a logical id and applies the optional suffix to its file name.
///
/// The suffix replaces everything after the last `_` of the file name, so
/// `..._sciimg.fits` with suffix `mskimg.fits` becomes `..._mskimg.fits`.
///
/// # Errors
///
/// Returns [`ConfigError::UnresolvableId`] when the id is empty, absolute,
/// escapes its root, or cannot take the suffix.
pub fn relative_path(logical_id: &str, suffix: Option<&str>) -> Result<PathBuf, ConfigError> {
    let trimmed = logical_id.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::unresolvable(logical_id, "empty identifier"));
    }

    let mut relative = PathBuf::new();
    for part in trimmed.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return Err(ConfigError::unresolvable(
                logical_id,
                "relative path components are not allowed",
            ));
        }
        relative.push(part);
    }

    if let Some(suffix) = suffix {
        let file_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ConfigError::unresolvable(logical_id, "missing file name"))?;
        let (stem, _) = file_name.rsplit_once('_').ok_or_else(|| {
            ConfigError::unresolvable(logical_id, "file name has no '_' to attach a suffix to")
        })?;
        let renamed = format!("{stem}_{}", suffix.trim_start_matches('_'));
        relative.set_file_name(renamed);
    }

    Ok(relative)
}
