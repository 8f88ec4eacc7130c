//! Credentials and authenticated sessions.
//!
//! [`SessionManager`] turns stored (or prompted) [`Credentials`] into a
//! logged-in [`Session`]. Credentials live in an [`IniCredentialStore`];
//! secrets there are base64-obfuscated, not encrypted.

mod credentials;
mod error;
mod session;

pub use credentials::{CredentialPrompt, CredentialStore, Credentials, IniCredentialStore};
pub use error::AuthError;
pub use session::{Session, SessionError, SessionManager};
