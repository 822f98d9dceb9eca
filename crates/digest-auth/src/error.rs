use std::fmt;

use crate::credentials::ParseError;

/// Why a request was not authenticated.
///
/// The variant is for logs and metrics only. What the client sees is decided
/// by [`AuthError::issues_challenge`] and the status code, and deliberately
/// does not distinguish `UnknownUser` from `ResponseMismatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header, or one for another scheme.
    MissingCredentials,
    /// The `Authorization` value could not be parsed.
    MalformedHeader,
    /// A required digest parameter was absent.
    MissingField(&'static str),
    UnknownUser,
    /// Nonce never issued by this server, or already evicted.
    UnknownNonce,
    StaleNonce,
    ReplayDetected,
    ResponseMismatch,
    /// Too many attempts from this peer.
    RateLimited,
}

impl AuthError {
    /// Low-cardinality label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::MissingField(_) => "missing_field",
            AuthError::UnknownUser => "unknown_user",
            AuthError::UnknownNonce => "unknown_nonce",
            AuthError::StaleNonce => "stale_nonce",
            AuthError::ReplayDetected => "replay",
            AuthError::ResponseMismatch => "response_mismatch",
            AuthError::RateLimited => "rate_limited",
        }
    }

    /// HTTP status the failure surfaces as.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::RateLimited => 429,
            _ => 401,
        }
    }

    /// Whether the 401 carries a fresh `WWW-Authenticate` challenge.
    ///
    /// Replays get none: the client must restart the handshake.
    pub fn issues_challenge(&self) -> bool {
        !matches!(self, AuthError::ReplayDetected | AuthError::RateLimited)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "no digest credentials presented"),
            AuthError::MalformedHeader => write!(f, "malformed Authorization header"),
            AuthError::MissingField(field) => write!(f, "missing digest parameter: {}", field),
            AuthError::UnknownUser => write!(f, "unknown user"),
            AuthError::UnknownNonce => write!(f, "unknown nonce"),
            AuthError::StaleNonce => write!(f, "stale nonce"),
            AuthError::ReplayDetected => write!(f, "nonce count replay detected"),
            AuthError::ResponseMismatch => write!(f, "digest response mismatch"),
            AuthError::RateLimited => write!(f, "authentication rate limit exceeded"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ParseError> for AuthError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MissingField(field) => AuthError::MissingField(field),
            _ => AuthError::MalformedHeader,
        }
    }
}
