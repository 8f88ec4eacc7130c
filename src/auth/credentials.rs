//! Credential storage.
//!
//! [`IniCredentialStore`] keeps one `[service]` section per remote service in
//! a small INI-style file:
//!
//! ```text
//! [primary]
//! username = ada
//! password = c2VjcmV0
//!
//! [broker]
//! token = dG9rZW4=
//! ```
//!
//! Passwords and tokens are base64-encoded. This is obfuscation, NOT
//! encryption: anyone who can read the file can recover the secrets. The
//! file is written with owner-only permissions on Unix.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};

use super::error::AuthError;

/// Secret material for one service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password for a login endpoint.
    Password {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// Bearer-style token.
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"[REDACTED]").finish(),
        }
    }
}

/// Source of stored credentials, keyed by service name.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Loads the credentials of `service`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the store exists but cannot be read.
    fn load(&self, service: &str) -> Result<Option<Credentials>, AuthError>;

    /// Writes (or replaces) the credentials of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the store cannot be written.
    fn set_account(&self, service: &str, credentials: &Credentials) -> Result<(), AuthError>;
}

/// Interactive fallback used when the store has no entry.
pub trait CredentialPrompt: Send + Sync + fmt::Debug {
    /// Asks the user for the credentials of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Prompt`] when input fails or is aborted.
    fn prompt(&self, service: &str) -> Result<Credentials, AuthError>;
}

/// File-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct IniCredentialStore {
    path: PathBuf,
}

impl IniCredentialStore {
    /// Store backed by the file at `path` (created on first write).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the credential file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_sections(&self) -> Result<Vec<Section>, AuthError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_sections(&raw, &self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AuthError::store(&self.path, e)),
        }
    }

    fn write_sections(&self, sections: &[Section]) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuthError::store(parent, e))?;
        }
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        fs::write(&tmp, render_sections(sections)).map_err(|e| AuthError::store(&tmp, e))?;
        restrict_permissions(&tmp).map_err(|e| AuthError::store(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AuthError::store(&self.path, e)
        })
    }
}

impl CredentialStore for IniCredentialStore {
    fn load(&self, service: &str) -> Result<Option<Credentials>, AuthError> {
        let sections = self.read_sections()?;
        let Some(section) = sections.iter().find(|s| s.name == service) else {
            debug!(service, path = %self.path.display(), "no stored credentials");
            return Ok(None);
        };

        if let Some(token) = section.get("token") {
            return Ok(Some(Credentials::Token(self.decode(service, token)?)));
        }
        match (section.get("username"), section.get("password")) {
            (Some(username), Some(password)) => Ok(Some(Credentials::Password {
                username: username.to_string(),
                password: self.decode(service, password)?,
            })),
            _ => Err(AuthError::parse(
                &self.path,
                0,
                format!("section [{service}] needs either `token` or `username` and `password`"),
            )),
        }
    }

    fn set_account(&self, service: &str, credentials: &Credentials) -> Result<(), AuthError> {
        let mut sections = self.read_sections()?;
        let entries = match credentials {
            Credentials::Password { username, password } => vec![
                ("username".to_string(), username.clone()),
                ("password".to_string(), STANDARD.encode(password)),
            ],
            Credentials::Token(token) => vec![("token".to_string(), STANDARD.encode(token))],
        };
        let section = Section {
            name: service.to_string(),
            entries,
        };
        match sections.iter_mut().find(|s| s.name == service) {
            Some(existing) => *existing = section,
            None => sections.push(section),
        }
        self.write_sections(&sections)?;
        info!(service, path = %self.path.display(), "stored credentials");
        Ok(())
    }
}

impl IniCredentialStore {
    fn decode(&self, service: &str, value: &str) -> Result<String, AuthError> {
        STANDARD
            .decode(value.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| {
                AuthError::parse(
                    &self.path,
                    0,
                    format!("section [{service}] holds a value that is not valid base64 text"),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_sections(raw: &str, path: &Path) -> Result<Vec<Section>, AuthError> {
    let mut sections: Vec<Section> = Vec::new();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim();
            if name.is_empty() {
                return Err(AuthError::parse(path, line_index + 1, "empty section name"));
            }
            sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(AuthError::parse(
                path,
                line_index + 1,
                "expected `key = value` or `[section]`",
            ));
        };
        let Some(section) = sections.last_mut() else {
            return Err(AuthError::parse(
                path,
                line_index + 1,
                "entry appears before any [section]",
            ));
        };
        section
            .entries
            .push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(sections)
}

fn render_sections(sections: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", section.name));
        for (key, value) in &section.entries {
            out.push_str(&format!("{key} = {value}\n"));
        }
    }
    out
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, IniCredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IniCredentialStore::new(dir.path().join("skycache.ini"));
        (dir, store)
    }

    #[test]
    fn test_absent_file_and_section_are_none() {
        let (_dir, store) = store();
        assert!(store.load("primary").unwrap().is_none());
        store
            .set_account("broker", &Credentials::Token("t".into()))
            .unwrap();
        assert!(store.load("primary").unwrap().is_none());
    }

    #[test]
    fn test_password_round_trip_is_obfuscated_on_disk() {
        let (_dir, store) = store();
        let creds = Credentials::Password {
            username: "ada".into(),
            password: "s3cret!".into(),
        };
        store.set_account("primary", &creds).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("[primary]"));
        assert!(raw.contains("username = ada"));
        assert!(!raw.contains("s3cret!"));
        assert_eq!(store.load("primary").unwrap(), Some(creds));
    }

    #[test]
    fn test_set_account_replaces_and_preserves_other_sections() {
        let (_dir, store) = store();
        store
            .set_account("broker", &Credentials::Token("abc".into()))
            .unwrap();
        store
            .set_account(
                "primary",
                &Credentials::Password {
                    username: "a".into(),
                    password: "1".into(),
                },
            )
            .unwrap();
        store
            .set_account(
                "primary",
                &Credentials::Password {
                    username: "b".into(),
                    password: "2".into(),
                },
            )
            .unwrap();

        assert_eq!(
            store.load("broker").unwrap(),
            Some(Credentials::Token("abc".into()))
        );
        assert!(matches!(
            store.load("primary").unwrap(),
            Some(Credentials::Password { username, .. }) if username == "b"
        ));
        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.matches("[primary]").count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store
            .set_account("broker", &Credentials::Token("abc".into()))
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_malformed_file_reports_line() {
        let (_dir, store) = store();
        fs::write(store.path(), "username = orphan\n").unwrap();
        let err = store.load("primary").unwrap_err();
        assert!(matches!(err, AuthError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_incomplete_section_is_parse_error() {
        let (_dir, store) = store();
        fs::write(store.path(), "[primary]\nusername = ada\n").unwrap();
        assert!(matches!(
            store.load("primary"),
            Err(AuthError::Parse { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::Password {
            username: "ada".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("ada"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::Token("tok".into())).contains("tok\""));
    }
}
