//! `Authorization: Digest ...` credential parsing.

use std::fmt;

use digest_parse::parse_authorization_header;
use smol_str::SmolStr;

use crate::digest::{DigestAlgorithm, Qop};

const SCHEME_PREFIX: &str = "Digest ";
const NC_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Wrong scheme, broken quoting, duplicates, oversize input.
    MalformedHeader,
    MissingField(&'static str),
    UnsupportedAlgorithm,
    UnsupportedQop,
    /// `nc` is not exactly eight hex digits.
    InvalidNonceCount,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedHeader => write!(f, "malformed digest credentials"),
            ParseError::MissingField(field) => write!(f, "missing digest parameter: {}", field),
            ParseError::UnsupportedAlgorithm => write!(f, "unsupported digest algorithm"),
            ParseError::UnsupportedQop => write!(f, "unsupported qop"),
            ParseError::InvalidNonceCount => write!(f, "nc must be 8 hex digits"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Request counter as sent by the client.
///
/// The raw text enters the digest verbatim, the numeric value drives
/// replay tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCount {
    raw: SmolStr,
    value: u32,
}

impl NonceCount {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.len() != NC_DIGITS || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidNonceCount);
        }
        let value = u32::from_str_radix(raw, 16).map_err(|_| ParseError::InvalidNonceCount)?;
        Ok(Self {
            raw: SmolStr::new(raw),
            value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

/// Parameters of one `Authorization` header. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub username: SmolStr,
    pub realm: SmolStr,
    pub nonce: SmolStr,
    pub uri: SmolStr,
    pub algorithm: DigestAlgorithm,
    pub qop: Option<Qop>,
    pub nc: Option<NonceCount>,
    pub cnonce: Option<SmolStr>,
    pub response: SmolStr,
    pub opaque: Option<SmolStr>,
}

/// Parses an `Authorization` header value.
///
/// The scheme must be exactly `Digest` followed by a space. With `qop=auth`
/// the `nc` and `cnonce` parameters become mandatory.
///
/// # Examples
///
/// ```
/// use digest_auth::{parse_credentials, ParseError};
///
/// let creds = parse_credentials(
///     r#"Digest username="admin", realm="r", nonce="n", uri="/", response="abc""#,
/// ).unwrap();
/// assert_eq!(creds.username, "admin");
/// assert!(creds.qop.is_none());
///
/// assert_eq!(parse_credentials("Basic YWRtaW4="), Err(ParseError::MalformedHeader));
/// ```
pub fn parse_credentials(header: &str) -> Result<CredentialSet, ParseError> {
    if !header.starts_with(SCHEME_PREFIX) {
        return Err(ParseError::MalformedHeader);
    }
    let parsed = parse_authorization_header(header).ok_or(ParseError::MalformedHeader)?;
    let required = |name: &'static str| {
        parsed
            .param(name)
            .cloned()
            .ok_or(ParseError::MissingField(name))
    };

    let username = required("username")?;
    let realm = required("realm")?;
    let nonce = required("nonce")?;
    let uri = required("uri")?;
    let response = required("response")?;

    let algorithm = match parsed.param("algorithm") {
        Some(value) => {
            DigestAlgorithm::parse(value).ok_or(ParseError::UnsupportedAlgorithm)?
        }
        None => DigestAlgorithm::Md5,
    };

    let qop = match parsed.param("qop") {
        Some(value) => Some(Qop::parse(value).ok_or(ParseError::UnsupportedQop)?),
        None => None,
    };

    let (nc, cnonce) = if qop.is_some() {
        let nc = NonceCount::parse(&required("nc")?)?;
        (Some(nc), Some(required("cnonce")?))
    } else {
        let nc = parsed.param("nc").map(|v| NonceCount::parse(v)).transpose()?;
        (nc, parsed.param("cnonce").cloned())
    };

    Ok(CredentialSet {
        username,
        realm,
        nonce,
        uri,
        algorithm,
        qop,
        nc,
        cnonce,
        response,
        opaque: parsed.param("opaque").cloned(),
    })
}
