//! The closed allowlist of remote hosts.
//!
//! Each host is a variant of [`Host`]; per-host behavior (authentication
//! scheme, login request shape, redownload support) is selected with an
//! exhaustive `match` rather than string comparisons.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::config::ConfigError;

/// A remote location this crate is permitted to contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Host {
    /// The archive's primary, authenticated host.
    Primary,
    /// Secondary read-only mirror.
    Mirror,
}

/// How a host authenticates requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Anonymous access.
    None,
    /// Cookie obtained from a login endpoint (username/password GET).
    CookieLogin,
}

impl Host {
    /// Every allowlisted host.
    pub const ALL: [Host; 2] = [Host::Primary, Host::Mirror];

    /// Stable lowercase name, also used as credential-store section name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Mirror => "mirror",
        }
    }

    /// Authentication scheme used by the host.
    #[must_use]
    pub fn auth_scheme(self) -> AuthScheme {
        match self {
            Self::Primary => AuthScheme::CookieLogin,
            Self::Mirror => AuthScheme::None,
        }
    }

    /// Whether corrupted files from this host may be re-queued automatically.
    #[must_use]
    pub fn supports_redownload(self) -> bool {
        match self {
            Self::Primary => true,
            Self::Mirror => false,
        }
    }

    /// Builds the login request URL for cookie authentication.
    ///
    /// Credentials travel as query parameters; values are percent-encoded.
    #[must_use]
    pub fn login_request_url(self, login_url: &Url, username: &str, password: &str) -> Url {
        let mut url = login_url.clone();
        match self {
            Self::Primary | Self::Mirror => {
                url.query_pairs_mut()
                    .append_pair("josso_cmd", "login")
                    .append_pair("josso_username", username)
                    .append_pair("josso_password", password);
            }
        }
        url
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Host {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "archive" => Ok(Self::Primary),
            "mirror" => Ok(Self::Mirror),
            _ => Err(ConfigError::UnsupportedHost {
                name: s.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|h| h.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}
