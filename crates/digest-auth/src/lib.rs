// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RFC 2617 HTTP Digest authentication.
//!
//! - [`parse_credentials`] turns an `Authorization` value into a [`CredentialSet`]
//! - [`NonceManager`] issues HMAC-signed nonces and enforces increasing `nc`
//! - [`expected_response`] computes the digest a client should have sent
//! - [`DigestGate`] ties these together and decides each request
//!
//! # Examples
//!
//! ```
//! use digest_auth::{Account, DigestClient, DigestGate, MemoryAccountStore};
//!
//! let store = MemoryAccountStore::new().with(Account::new("admin", "adminPassword"));
//! let gate = DigestGate::new("testrealm@example", b"server secret", store);
//!
//! // First request carries no credentials.
//! let denial = gate.authenticate("GET", None).denial().cloned().unwrap();
//! let challenge = denial.challenge.unwrap();
//!
//! let mut client = DigestClient::new("admin", "adminPassword");
//! let header = client.authorize("GET", "/resource", &challenge);
//! let result = gate.authenticate("GET", Some(&header));
//! assert_eq!(result.principal().unwrap().username, "admin");
//! ```

pub mod challenge;
pub mod client;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod gate;
pub mod nonce;
pub mod store;

pub use challenge::Challenge;
pub use client::DigestClient;
pub use credentials::{parse_credentials, CredentialSet, NonceCount, ParseError};
pub use digest::{expected_response, response_matches, DigestAlgorithm, Qop};
pub use error::AuthError;
pub use gate::{AuthResult, Denial, DigestGate};
pub use nonce::{NonceManager, NonceStatus, DEFAULT_NONCE_TTL};
pub use store::{Account, AccountStore, AsyncAccountStore, MemoryAccountStore, Principal};
