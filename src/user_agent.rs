//! User-Agent string sent with every archive request.

const PROJECT_UA_URL: &str = "https://github.com/fierce/skycache";

/// Default User-Agent for archive requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("skycache/{version} (science-archive-cache; +{PROJECT_UA_URL})")
}
