// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Auth-param lists shared by `Authorization` and `WWW-Authenticate` (RFC 7235 §2.1).
//!
//! # Security
//!
//! [`AuthHeader`] bounds everything it stores:
//! - scheme at most 64 bytes, token characters only
//! - at most 30 parameters, no duplicates (names compared case-insensitively)
//! - parameter names at most 64 bytes, values at most 1024 bytes
//! - no control characters except horizontal tab inside values

use std::collections::BTreeMap;
use std::fmt;

use smol_str::SmolStr;

const MAX_SCHEME_LENGTH: usize = 64;
const MAX_AUTH_PARAMS: usize = 30;
const MAX_PARAM_NAME_LENGTH: usize = 64;
const MAX_PARAM_VALUE_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeaderError {
    InvalidScheme(String),
    InvalidParameter(String),
    DuplicateParameter(SmolStr),
    TooManyParameters { max: usize },
    TooLong { field: &'static str, max: usize },
}

impl fmt::Display for AuthHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthHeaderError::InvalidScheme(msg) => write!(f, "Invalid scheme: {}", msg),
            AuthHeaderError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            AuthHeaderError::DuplicateParameter(name) => {
                write!(f, "Duplicate parameter: {}", name)
            }
            AuthHeaderError::TooManyParameters { max } => {
                write!(f, "Too many parameters (max {})", max)
            }
            AuthHeaderError::TooLong { field, max } => {
                write!(f, "{} too long (max {})", field, max)
            }
        }
    }
}

impl std::error::Error for AuthHeaderError {}

fn validate_scheme(scheme: &str) -> Result<(), AuthHeaderError> {
    if scheme.is_empty() {
        return Err(AuthHeaderError::InvalidScheme(
            "scheme cannot be empty".to_string(),
        ));
    }
    if scheme.len() > MAX_SCHEME_LENGTH {
        return Err(AuthHeaderError::TooLong {
            field: "scheme",
            max: MAX_SCHEME_LENGTH,
        });
    }
    if !scheme.chars().all(is_token_char) {
        return Err(AuthHeaderError::InvalidScheme(
            "contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_param_name(name: &str) -> Result<(), AuthHeaderError> {
    if name.is_empty() {
        return Err(AuthHeaderError::InvalidParameter(
            "parameter name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_PARAM_NAME_LENGTH {
        return Err(AuthHeaderError::TooLong {
            field: "parameter name",
            max: MAX_PARAM_NAME_LENGTH,
        });
    }
    if !name.chars().all(is_token_char) {
        return Err(AuthHeaderError::InvalidParameter(
            "parameter name contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_param_value(value: &str) -> Result<(), AuthHeaderError> {
    if value.len() > MAX_PARAM_VALUE_LENGTH {
        return Err(AuthHeaderError::TooLong {
            field: "parameter value",
            max: MAX_PARAM_VALUE_LENGTH,
        });
    }
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(AuthHeaderError::InvalidParameter(
            "parameter value contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// RFC 7230 `tchar`.
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

/// Backslash-escapes `"` and `\` for use inside a quoted-string.
pub fn escape_quoted_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Validated `scheme param=value, ...` header value.
///
/// # Examples
///
/// ```
/// use digest_core::AuthHeader;
///
/// let mut auth = AuthHeader::new("Digest").unwrap();
/// auth.add_param("username", "admin").unwrap();
/// auth.add_param("nc", "00000001").unwrap();
///
/// assert_eq!(auth.scheme(), "Digest");
/// assert_eq!(auth.param("NC").map(|v| v.as_str()), Some("00000001"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    scheme: SmolStr,
    params: BTreeMap<SmolStr, SmolStr>,
}

impl AuthHeader {
    pub fn new(scheme: impl Into<SmolStr>) -> Result<Self, AuthHeaderError> {
        let scheme = scheme.into();
        validate_scheme(&scheme)?;
        Ok(Self {
            scheme,
            params: BTreeMap::new(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn params(&self) -> &BTreeMap<SmolStr, SmolStr> {
        &self.params
    }

    /// Case-insensitive parameter lookup.
    pub fn param(&self, name: &str) -> Option<&SmolStr> {
        self.params.get(&SmolStr::new(name.to_ascii_lowercase()))
    }

    /// Adds a parameter, rejecting duplicates.
    ///
    /// A repeated `nonce` or `response` is never benign in a credential, so
    /// the parser relies on this to refuse such headers outright.
    pub fn add_param(
        &mut self,
        name: impl Into<SmolStr>,
        value: impl Into<SmolStr>,
    ) -> Result<(), AuthHeaderError> {
        let name = name.into();
        let value = value.into();

        validate_param_name(&name)?;
        validate_param_value(&value)?;

        let key = SmolStr::new(name.to_ascii_lowercase());
        if self.params.contains_key(&key) {
            return Err(AuthHeaderError::DuplicateParameter(key));
        }
        if self.params.len() >= MAX_AUTH_PARAMS {
            return Err(AuthHeaderError::TooManyParameters {
                max: MAX_AUTH_PARAMS,
            });
        }

        self.params.insert(key, value);
        Ok(())
    }
}
