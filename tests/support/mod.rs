//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod fits;
pub mod socket_guard;

use std::path::Path;

use skycache_core::config::HostEndpoint;
use skycache_core::{CacheConfig, Credentials, Host};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use fits::minimal_fits;
pub use socket_guard::start_mock_server_or_skip;

/// Configuration pointing the primary host at `server`, with data under
/// `/data/` and the login endpoint at `/login`.
pub fn config_for(server: &MockServer, root: &Path) -> CacheConfig {
    let endpoint = HostEndpoint::parse(
        &format!("{}/data/", server.uri()),
        Some(&format!("{}/login", server.uri())),
    )
    .unwrap();
    let mirror = HostEndpoint::parse(&format!("{}/mirror/", server.uri()), None).unwrap();
    CacheConfig::new(root, root.join("credentials.ini"))
        .unwrap()
        .with_endpoint(Host::Primary, endpoint)
        .with_endpoint(Host::Mirror, mirror)
        .with_timeouts(5, 30)
}

pub fn credentials() -> Credentials {
    Credentials::Password {
        username: "ada".to_string(),
        password: "pw".to_string(),
    }
}

/// Login endpoint granting a session cookie, expected `calls` times.
pub async fn mount_login(server: &MockServer, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "JOSSO_SESSIONID=s1; Path=/"),
        )
        .expect(calls)
        .mount(server)
        .await;
}

/// Serves `body` at `/data/<relative>`, expected `calls` times.
pub async fn mount_product(server: &MockServer, relative: &str, body: Vec<u8>, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/data/{relative}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(calls)
        .mount(server)
        .await;
}
