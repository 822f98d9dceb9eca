// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use smol_str::SmolStr;

use crate::{headers::Headers, method::Method};

const MAX_REASON_LENGTH: usize = 128;
const MAX_TARGET_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    InvalidStatusCode { code: u16 },
    ReasonTooLong { max: usize, actual: usize },
    InvalidReason(String),
    InvalidTarget(String),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStatusCode { code } => {
                write!(f, "invalid HTTP status code: {} (must be 100-599)", code)
            }
            Self::ReasonTooLong { max, actual } => {
                write!(f, "reason phrase too long (max {}, got {})", max, actual)
            }
            Self::InvalidReason(msg) => write!(f, "invalid reason phrase: {}", msg),
            Self::InvalidTarget(msg) => write!(f, "invalid request target: {}", msg),
        }
    }
}

impl std::error::Error for MessageError {}

/// HTTP protocol version carried on the request and status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "HTTP/1.0" => Some(HttpVersion::Http10),
            "HTTP/1.1" => Some(HttpVersion::Http11),
            _ => None,
        }
    }
}

/// First line of an HTTP request: `Method SP request-target SP HTTP-version`.
///
/// The request target is kept verbatim because Digest credentials echo it in
/// their `uri` parameter and the two must compare byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    target: SmolStr,
    version: HttpVersion,
}

impl RequestLine {
    /// Builds an HTTP/1.1 request line.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is empty, too long, or contains
    /// whitespace or control characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use digest_core::{Method, RequestLine};
    ///
    /// let line = RequestLine::new(Method::Get, "/resource").unwrap();
    /// assert_eq!(line.target(), "/resource");
    /// assert!(RequestLine::new(Method::Get, "/a b").is_err());
    /// ```
    pub fn new(method: Method, target: impl AsRef<str>) -> Result<Self, MessageError> {
        let target = target.as_ref();
        validate_target(target)?;
        Ok(Self {
            method,
            target: SmolStr::new(target),
            version: HttpVersion::Http11,
        })
    }

    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }
}

/// Status line of an HTTP response.
///
/// # Security
///
/// Reason phrases are checked for control characters so a caller cannot
/// smuggle extra header lines into a serialized response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    code: u16,
    reason: SmolStr,
}

impl StatusLine {
    /// # Examples
    ///
    /// ```
    /// use digest_core::StatusLine;
    ///
    /// let status = StatusLine::new(401, "Unauthorized").unwrap();
    /// assert_eq!(status.code(), 401);
    /// assert!(StatusLine::new(99, "Nope").is_err());
    /// assert!(StatusLine::new(200, "OK\r\nSet-Cookie: x").is_err());
    /// ```
    pub fn new(code: u16, reason: impl AsRef<str>) -> Result<Self, MessageError> {
        if !(100..=599).contains(&code) {
            return Err(MessageError::InvalidStatusCode { code });
        }
        let reason = reason.as_ref();
        validate_reason_phrase(reason)?;
        Ok(Self {
            code,
            reason: SmolStr::new(reason),
        })
    }

    pub fn ok() -> Self {
        Self::fixed(200, "OK")
    }

    pub fn bad_request() -> Self {
        Self::fixed(400, "Bad Request")
    }

    pub fn unauthorized() -> Self {
        Self::fixed(401, "Unauthorized")
    }

    pub fn too_many_requests() -> Self {
        Self::fixed(429, "Too Many Requests")
    }

    fn fixed(code: u16, reason: &'static str) -> Self {
        Self {
            code,
            reason: SmolStr::new(reason),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }
}

/// Request head as seen by the authenticator. Bodies are not read: Digest
/// `qop=auth` never covers them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    start: RequestLine,
    headers: Headers,
}

impl Request {
    pub fn new(start: RequestLine, headers: Headers) -> Self {
        Self { start, headers }
    }

    pub fn start_line(&self) -> &RequestLine {
        &self.start
    }

    pub fn method(&self) -> &Method {
        self.start.method()
    }

    pub fn target(&self) -> &str {
        self.start.target()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusLine,
    headers: Headers,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusLine, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn code(&self) -> u16 {
        self.status.code()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn validate_reason_phrase(reason: &str) -> Result<(), MessageError> {
    if reason.len() > MAX_REASON_LENGTH {
        return Err(MessageError::ReasonTooLong {
            max: MAX_REASON_LENGTH,
            actual: reason.len(),
        });
    }
    if reason.chars().any(|c| c.is_control() && c != '\t') {
        return Err(MessageError::InvalidReason(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_target(target: &str) -> Result<(), MessageError> {
    if target.is_empty() {
        return Err(MessageError::InvalidTarget("empty".to_string()));
    }
    if target.len() > MAX_TARGET_LENGTH {
        return Err(MessageError::InvalidTarget(format!(
            "longer than {} bytes",
            MAX_TARGET_LENGTH
        )));
    }
    if target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(MessageError::InvalidTarget(
            "contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_rejects_out_of_range_codes() {
        assert!(StatusLine::new(600, "Nope").is_err());
        assert!(StatusLine::new(401, "Unauthorized").is_ok());
    }

    #[test]
    fn fixed_status_lines() {
        assert_eq!(StatusLine::unauthorized().code(), 401);
        assert_eq!(StatusLine::too_many_requests().reason(), "Too Many Requests");
        assert!(StatusLine::ok().is_success());
        assert!(StatusLine::bad_request().is_client_error());
    }

    #[test]
    fn request_line_validates_target() {
        assert!(RequestLine::new(Method::Get, "").is_err());
        assert!(RequestLine::new(Method::Get, "/x\r\n").is_err());
        let long = format!("/{}", "a".repeat(MAX_TARGET_LENGTH));
        assert!(RequestLine::new(Method::Get, long).is_err());
    }

    #[test]
    fn version_tokens() {
        assert_eq!(HttpVersion::parse("HTTP/1.1"), Some(HttpVersion::Http11));
        assert_eq!(HttpVersion::parse("HTTP/2"), None);
        let line = RequestLine::new(Method::Get, "/")
            .unwrap()
            .with_version(HttpVersion::Http10);
        assert_eq!(line.version().as_str(), "HTTP/1.0");
    }

    #[test]
    fn error_display() {
        let err = MessageError::InvalidStatusCode { code: 42 };
        assert_eq!(
            err.to_string(),
            "invalid HTTP status code: 42 (must be 100-599)"
        );
    }
}
