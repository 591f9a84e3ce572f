/*
[INPUT]:  API key and auth tunables
[OUTPUT]: Session credentials, single-flight refresh, credential provider seam
[POS]:    Auth layer - handles GRVT session authentication
[UPDATE]: When the auth flow or credential storage changes
*/

pub mod credential;
pub mod manager;

pub use credential::{Credential, CredentialState, CredentialStore};
pub use manager::{CredentialProvider, LOGIN_PATH, SessionAuthenticator};
