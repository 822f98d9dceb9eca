// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core HTTP types used by the digest authentication crates.
//!
//! This crate provides the narrow HTTP surface the authenticator needs:
//! - **Messages**: [`Request`] (request line + headers), [`Response`] (status + headers + body)
//! - **Headers**: [`Headers`] container preserving insertion order
//! - **Methods**: [`Method`] enum (GET, POST, ...)
//! - **Auth parameters**: [`AuthHeader`], the validated `scheme param=value, ...` shape
//!   shared by `Authorization` and `WWW-Authenticate`
//!
//! # Examples
//!
//! ```
//! # use digest_core::*;
//! let mut auth = AuthHeader::new("Digest").unwrap();
//! auth.add_param("realm", "testrealm@example").unwrap();
//! assert_eq!(auth.param("REALM").map(|v| v.as_str()), Some("testrealm@example"));
//! ```

pub mod auth;
pub mod headers;
pub mod method;
pub mod msg;

pub use auth::{escape_quoted_value, AuthHeader, AuthHeaderError};
pub use headers::{Header, Headers};
pub use method::Method;
pub use msg::{HttpVersion, MessageError, Request, RequestLine, Response, StatusLine};
