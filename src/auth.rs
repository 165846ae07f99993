use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::AuthConfig;

/// A credential pair extracted from one request. Transient: lives for
/// the duration of the authorization check and is never persisted or
/// logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// The password must never reach a log line, so Debug redacts it.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Missing header, wrong scheme, undecodable payload, missing `:`
    /// separator, or control characters in the decoded text. Collapsed
    /// into one kind so the caller cannot tell which check failed.
    InvalidCredentialFormat,
    /// Well-formed credentials that do not match the configured pair.
    AuthorizationDenied,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentialFormat => {
                write!(f, "invalid authorization credential format")
            }
            AuthError::AuthorizationDenied => write!(f, "authorization denied"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Parse a `Basic <base64>` authorization header value into a credential
/// pair. The decoded payload must be UTF-8, contain a `:`, and contain
/// no control characters. The username is the text before the first
/// colon, so passwords may themselves contain colons.
pub fn parse_basic_authorization(header: &str) -> Result<Credentials, AuthError> {
    let (scheme, encoded) = header
        .split_once(' ')
        .ok_or(AuthError::InvalidCredentialFormat)?;
    if scheme != "Basic" || encoded.is_empty() {
        return Err(AuthError::InvalidCredentialFormat);
    }
    let decoded = BASE64
        .decode(encoded)
        .map_err(|_| AuthError::InvalidCredentialFormat)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredentialFormat)?;
    if decoded
        .chars()
        .any(|c| matches!(c, '\u{00}'..='\u{1f}' | '\u{7f}'))
    {
        return Err(AuthError::InvalidCredentialFormat);
    }
    let (username, password) = decoded
        .split_once(':')
        .ok_or(AuthError::InvalidCredentialFormat)?;
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

impl Credentials {
    /// Compare against the configured static pair. A mismatch is a
    /// distinct error kind internally, but the HTTP boundary maps it to
    /// the same 401 as a format failure.
    pub fn verify(&self, config: &AuthConfig) -> Result<(), AuthError> {
        if self.username == config.username && self.password == config.password {
            Ok(())
        } else {
            Err(AuthError::AuthorizationDenied)
        }
    }
}
