// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The authentication gate: one decision per request.
//!
//! Order of checks matters for what a client can learn. Realm, algorithm,
//! opaque and uri are compared first, then the nonce is validated (and its
//! counter consumed), and only then is the account looked up. An unknown
//! user still pays for a full digest computation and is answered exactly
//! like a wrong password.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use digest_core::{Headers, Request, Response, StatusLine};
use digest_observe::{auth_metrics, span_for_auth};
use digest_ratelimit::RateLimiter;
use rand::{thread_rng, RngCore};
use smol_str::SmolStr;
use tracing::{debug, info, warn, Instrument};

use crate::challenge::Challenge;
use crate::credentials::{parse_credentials, CredentialSet};
use crate::digest::{expected_response, response_matches, DigestAlgorithm};
use crate::error::AuthError;
use crate::nonce::{NonceManager, NonceStatus, DEFAULT_NONCE_TTL};
use crate::store::{Account, AccountStore, AsyncAccountStore, Principal};

/// Secret used to burn the same digest work for unknown users.
const DUMMY_SECRET: &str = "digest-auth-unknown-user";

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(Principal),
    Denied(Denial),
}

impl AuthResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthResult::Authenticated(principal) => Some(principal),
            AuthResult::Denied(_) => None,
        }
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            AuthResult::Authenticated(_) => None,
            AuthResult::Denied(denial) => Some(denial),
        }
    }
}

/// A refused request and what to send back.
///
/// `reason` is for logs and metrics; it must not be reflected to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub status: u16,
    pub reason: AuthError,
    pub challenge: Option<Challenge>,
}

impl Denial {
    /// Value for the `WWW-Authenticate` header, if this denial carries one.
    pub fn www_authenticate(&self) -> Option<String> {
        self.challenge.as_ref().map(|c| c.to_string())
    }

    pub fn to_response(&self) -> Response {
        let (status, body) = match self.status {
            429 => (StatusLine::too_many_requests(), "Too Many Requests\n"),
            _ => (StatusLine::unauthorized(), "Unauthorized\n"),
        };
        let mut headers = Headers::new();
        if let Some(value) = self.www_authenticate() {
            headers.push("WWW-Authenticate", value);
        }
        headers.push("Content-Type", "text/plain; charset=utf-8");
        Response::new(status, headers, Bytes::from_static(body.as_bytes()))
    }
}

/// Digest authentication for one realm.
pub struct DigestGate<S> {
    realm: SmolStr,
    algorithm: DigestAlgorithm,
    opaque: Option<SmolStr>,
    store: S,
    nonces: NonceManager,
    rate_limiter: Option<RateLimiter>,
    challenge_limiter: Option<RateLimiter>,
}

impl<S> std::fmt::Debug for DigestGate<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestGate")
            .field("realm", &self.realm)
            .field("algorithm", &self.algorithm)
            .field("nonces", &self.nonces)
            .field("rate_limited", &self.rate_limiter.is_some())
            .field("challenge_limited", &self.challenge_limiter.is_some())
            .finish()
    }
}

impl<S> DigestGate<S> {
    /// `secret` keys the nonce MAC. It is never sent to clients.
    pub fn new(realm: impl Into<SmolStr>, secret: &[u8], store: S) -> Self {
        let mut opaque = [0u8; 16];
        thread_rng().fill_bytes(&mut opaque);
        Self {
            realm: realm.into(),
            algorithm: DigestAlgorithm::Md5,
            opaque: Some(SmolStr::new(hex::encode(opaque))),
            store,
            nonces: NonceManager::new(secret, DEFAULT_NONCE_TTL),
            rate_limiter: None,
            challenge_limiter: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// `None` stops advertising an opaque value.
    pub fn with_opaque(mut self, opaque: Option<SmolStr>) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_nonce_manager(mut self, nonces: NonceManager) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonces = self.nonces.with_ttl(ttl);
        self
    }

    /// Charged for requests that present credentials.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Charged for requests without credentials, each of which costs a nonce
    /// slot. Should be looser than the credential limiter.
    pub fn with_challenge_limiter(mut self, limiter: RateLimiter) -> Self {
        self.challenge_limiter = Some(limiter);
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn nonce_manager(&self) -> &NonceManager {
        &self.nonces
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn challenge_limiter(&self) -> Option<&RateLimiter> {
        self.challenge_limiter.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issues a nonce and builds the challenge that carries it.
    pub fn challenge(&self, stale: bool) -> Challenge {
        let mut challenge = Challenge::new(self.realm.clone(), self.nonces.issue());
        challenge.algorithm = self.algorithm;
        challenge.opaque = self.opaque.clone();
        challenge.stale = stale;
        challenge
    }

    /// Everything before the account lookup. A returned credential set has
    /// already consumed its nonce counter.
    fn precheck(
        &self,
        authorization: Option<&str>,
        expected_uri: Option<&str>,
    ) -> Result<CredentialSet, AuthError> {
        let header = authorization.ok_or(AuthError::MissingCredentials)?;
        let scheme = header.split([' ', '\t']).next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("Digest") {
            return Err(AuthError::MissingCredentials);
        }

        let credentials = parse_credentials(header)?;

        if credentials.realm != self.realm || credentials.algorithm != self.algorithm {
            return Err(AuthError::ResponseMismatch);
        }
        if let (Some(ours), Some(theirs)) = (&self.opaque, &credentials.opaque) {
            if ours != theirs {
                return Err(AuthError::ResponseMismatch);
            }
        }
        if let Some(uri) = expected_uri {
            if credentials.uri != uri {
                return Err(AuthError::ResponseMismatch);
            }
        }

        // Without qop there is no counter: the nonce is good for one request.
        let (nc, cnonce) = match (&credentials.qop, &credentials.nc, &credentials.cnonce) {
            (Some(_), Some(nc), Some(cnonce)) => (nc.value(), cnonce.as_str()),
            _ => (1, ""),
        };
        match self.nonces.validate(&credentials.nonce, nc, cnonce) {
            NonceStatus::Fresh => Ok(credentials),
            NonceStatus::Stale => Err(AuthError::StaleNonce),
            NonceStatus::Replayed => Err(AuthError::ReplayDetected),
            NonceStatus::Unknown => Err(AuthError::UnknownNonce),
        }
    }

    fn verify(
        &self,
        method: &str,
        credentials: &CredentialSet,
        account: Option<Account>,
    ) -> Result<Principal, AuthError> {
        let Some(account) = account else {
            let expected = expected_response(method, credentials, DUMMY_SECRET);
            let _ = response_matches(&expected, &credentials.response);
            return Err(AuthError::UnknownUser);
        };

        let expected = expected_response(method, credentials, &account.secret);
        if response_matches(&expected, &credentials.response) {
            Ok(Principal::from(&account))
        } else {
            Err(AuthError::ResponseMismatch)
        }
    }

    fn conclude(&self, outcome: Result<Principal, AuthError>, started: Instant) -> AuthResult {
        let metrics = auth_metrics();
        let result = match outcome {
            Ok(principal) => {
                info!(user = %principal.username, "request authenticated");
                metrics.on_authenticated();
                AuthResult::Authenticated(principal)
            }
            Err(reason) => {
                match &reason {
                    AuthError::MissingCredentials => debug!("no credentials, challenging"),
                    AuthError::ReplayDetected | AuthError::RateLimited => {
                        warn!(reason = reason.kind(), "request refused")
                    }
                    _ => info!(reason = reason.kind(), "authentication failed"),
                }
                if reason != AuthError::MissingCredentials {
                    metrics.on_rejected(reason.kind());
                }

                let challenge = if reason.issues_challenge() {
                    let stale = reason == AuthError::StaleNonce;
                    metrics.on_challenge(stale);
                    Some(self.challenge(stale))
                } else {
                    None
                };
                AuthResult::Denied(Denial {
                    status: reason.status(),
                    reason,
                    challenge,
                })
            }
        };
        metrics.on_latency("authenticate", started.elapsed().as_nanos() as u64);
        result
    }
}

impl<S: AccountStore> DigestGate<S> {
    /// Decides one request given its method and `Authorization` value.
    pub fn authenticate(&self, method: &str, authorization: Option<&str>) -> AuthResult {
        let span = span_for_auth("authenticate", &self.realm);
        let _entered = span.enter();
        self.authenticate_inner(method, authorization, None)
    }

    /// Like [`authenticate`](Self::authenticate) for a parsed request.
    ///
    /// The credential `uri` must equal the request target. Requests carrying
    /// credentials are charged to the rate limiter, bare ones to the
    /// challenge limiter.
    pub fn authenticate_request(&self, request: &Request, peer: Option<IpAddr>) -> AuthResult {
        let span = span_for_auth("authenticate_request", &self.realm);
        let _entered = span.enter();
        let started = Instant::now();

        let mut values = request.headers().get_all("Authorization");
        let authorization = values.next().map(|v| v.as_str());
        if values.next().is_some() {
            return self.conclude(Err(AuthError::MalformedHeader), started);
        }
        let limiter = match authorization {
            Some(_) => self.rate_limiter.as_ref(),
            None => self.challenge_limiter.as_ref(),
        };
        if !admit(limiter, peer) {
            return self.conclude(Err(AuthError::RateLimited), started);
        }

        self.authenticate_inner(
            request.method().as_str(),
            authorization,
            Some(request.target()),
        )
    }

    fn authenticate_inner(
        &self,
        method: &str,
        authorization: Option<&str>,
        expected_uri: Option<&str>,
    ) -> AuthResult {
        let started = Instant::now();
        let outcome = self
            .precheck(authorization, expected_uri)
            .and_then(|credentials| {
                let account = self.store.find_account(&credentials.username);
                self.verify(method, &credentials, account)
            });
        self.conclude(outcome, started)
    }
}

fn admit(limiter: Option<&RateLimiter>, peer: Option<IpAddr>) -> bool {
    match (limiter, peer) {
        (Some(limiter), Some(ip)) => limiter.check_ip(ip),
        _ => true,
    }
}

impl<S: AsyncAccountStore> DigestGate<S> {
    /// [`authenticate`](DigestGate::authenticate) for stores that do I/O.
    pub async fn authenticate_async(&self, method: &str, authorization: Option<&str>) -> AuthResult {
        let span = span_for_auth("authenticate_async", &self.realm);
        async {
            let started = Instant::now();
            let outcome = match self.precheck(authorization, None) {
                Ok(credentials) => {
                    let account = self.store.find_account(&credentials.username).await;
                    self.verify(method, &credentials, account)
                }
                Err(err) => Err(err),
            };
            self.conclude(outcome, started)
        }
        .instrument(span)
        .await
    }
}
