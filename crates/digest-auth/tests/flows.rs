// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use digest_auth::{
    expected_response, parse_credentials, Account, AuthError, AuthResult, Challenge,
    DigestClient, DigestGate, MemoryAccountStore,
};
use digest_core::{Headers, Method, Request, RequestLine};
use digest_ratelimit::{RateLimitConfig, RateLimiter};

const REALM: &str = "testrealm@example";

fn gate() -> DigestGate<MemoryAccountStore> {
    let store = MemoryAccountStore::new()
        .with(Account::new("admin", "adminPassword").with_role("admin"))
        .with(Account::new("alice", "wonderland"));
    DigestGate::new(REALM, b"integration-secret", store)
}

fn challenge_from(result: &AuthResult) -> Challenge {
    result
        .denial()
        .and_then(|d| d.challenge.clone())
        .expect("denial should carry a challenge")
}

fn reason(result: &AuthResult) -> Option<AuthError> {
    result.denial().map(|d| d.reason.clone())
}

/// Builds a qop=auth header with an explicit counter, bypassing the client's
/// own bookkeeping.
fn header_with_nc(challenge: &Challenge, user: &str, secret: &str, nc: u32, cnonce: &str) -> String {
    let unsigned = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"/resource\", \
         algorithm=MD5, qop=auth, nc={:08x}, cnonce=\"{}\"",
        user, challenge.realm, challenge.nonce, nc, cnonce
    );
    let placeholder = parse_credentials(&format!("{}, response=\"00\"", unsigned))
        .expect("well-formed test header");
    let response = expected_response("GET", &placeholder, secret);
    format!("{}, response=\"{}\"", unsigned, response)
}

/// A client completes the qop=auth handshake.
#[test]
fn round_trip_with_qop() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));

    let mut client = DigestClient::new("admin", "adminPassword");
    let header = client.authorize("GET", "/resource", &challenge);
    let result = gate.authenticate("GET", Some(&header));

    let principal = result.principal().expect("authenticated");
    assert_eq!(principal.username, "admin");
    assert!(principal.has_role("admin"));
}

/// RFC 2069 clients without qop get one request per nonce.
#[test]
fn round_trip_without_qop() {
    let gate = gate();
    let mut challenge = challenge_from(&gate.authenticate("GET", None));
    challenge.qop = None;

    let mut client = DigestClient::new("alice", "wonderland");
    let header = client.authorize("GET", "/resource", &challenge);
    assert!(!header.contains("qop="));

    assert!(gate.authenticate("GET", Some(&header)).is_authenticated());
    assert_eq!(
        reason(&gate.authenticate("GET", Some(&header))),
        Some(AuthError::ReplayDetected)
    );
}

/// A wrong password yields a generic challenge.
#[test]
fn wrong_secret_is_rejected() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));
    let header = DigestClient::new("admin", "guess").authorize("GET", "/resource", &challenge);

    let result = gate.authenticate("GET", Some(&header));
    let denial = result.denial().expect("denied");
    assert_eq!(denial.status, 401);
    assert_eq!(denial.reason, AuthError::ResponseMismatch);
    assert!(denial.challenge.as_ref().is_some_and(|c| !c.stale));
}

/// Resending an accepted header is a replay and earns no new challenge.
#[test]
fn replay_is_refused_without_challenge() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));
    let header =
        DigestClient::new("admin", "adminPassword").authorize("GET", "/resource", &challenge);

    assert!(gate.authenticate("GET", Some(&header)).is_authenticated());

    let replay = gate.authenticate("GET", Some(&header));
    let denial = replay.denial().expect("denied");
    assert_eq!(denial.status, 401);
    assert_eq!(denial.reason, AuthError::ReplayDetected);
    assert!(denial.challenge.is_none());
    assert!(denial.www_authenticate().is_none());
}

/// Counters must strictly increase within a nonce.
#[test]
fn nonce_count_is_monotonic() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));

    let five = header_with_nc(&challenge, "admin", "adminPassword", 5, "c5");
    assert!(gate.authenticate("GET", Some(&five)).is_authenticated());

    let three = header_with_nc(&challenge, "admin", "adminPassword", 3, "c3");
    assert_eq!(
        reason(&gate.authenticate("GET", Some(&three))),
        Some(AuthError::ReplayDetected)
    );

    let six = header_with_nc(&challenge, "admin", "adminPassword", 6, "c6");
    assert!(gate.authenticate("GET", Some(&six)).is_authenticated());
}

/// An expired nonce produces `stale=true`; the fresh nonce then works.
#[test]
fn stale_nonce_then_success() {
    let gate = gate().with_nonce_ttl(Duration::from_millis(50));
    let challenge = challenge_from(&gate.authenticate("GET", None));
    let mut client = DigestClient::new("admin", "adminPassword");

    thread::sleep(Duration::from_millis(100));
    let header = client.authorize("GET", "/resource", &challenge);
    let result = gate.authenticate("GET", Some(&header));
    assert_eq!(reason(&result), Some(AuthError::StaleNonce));
    let renewed = challenge_from(&result);
    assert!(renewed.stale);
    assert_ne!(renewed.nonce, challenge.nonce);
    assert!(renewed.to_string().ends_with(", stale=true"));

    let header = client.authorize("GET", "/resource", &renewed);
    assert!(gate.authenticate("GET", Some(&header)).is_authenticated());
}

/// Every request still holding an expired nonce is told it is stale, not
/// just the first one to arrive.
#[test]
fn expired_nonce_is_stale_for_each_request() {
    let gate = gate().with_nonce_ttl(Duration::from_millis(50));
    let challenge = challenge_from(&gate.authenticate("GET", None));

    thread::sleep(Duration::from_millis(100));
    let first = DigestClient::new("admin", "adminPassword").authorize("GET", "/a", &challenge);
    let second = DigestClient::new("admin", "adminPassword").authorize("GET", "/b", &challenge);

    for header in [first, second] {
        let result = gate.authenticate("GET", Some(&header));
        assert_eq!(reason(&result), Some(AuthError::StaleNonce));
        assert!(challenge_from(&result).stale);
    }
}

/// Unknown users and wrong passwords look the same on the wire.
#[test]
fn username_existence_is_not_revealed() {
    let gate = gate();

    let first = challenge_from(&gate.authenticate("GET", None));
    let unknown = DigestClient::new("mallory", "x").authorize("GET", "/resource", &first);
    let unknown = gate.authenticate("GET", Some(&unknown));

    let second = challenge_from(&gate.authenticate("GET", None));
    let wrong = DigestClient::new("admin", "x").authorize("GET", "/resource", &second);
    let wrong = gate.authenticate("GET", Some(&wrong));

    assert_eq!(reason(&unknown), Some(AuthError::UnknownUser));
    assert_eq!(reason(&wrong), Some(AuthError::ResponseMismatch));

    let (a, b) = (unknown.denial().unwrap(), wrong.denial().unwrap());
    assert_eq!(a.status, b.status);

    let strip = |challenge: &Challenge| {
        challenge
            .to_string()
            .replace(challenge.nonce.as_str(), "<nonce>")
    };
    assert_eq!(
        strip(a.challenge.as_ref().unwrap()),
        strip(b.challenge.as_ref().unwrap())
    );

    let (ra, rb) = (a.to_response(), b.to_response());
    assert_eq!(ra.code(), rb.code());
    assert_eq!(ra.body(), rb.body());
}

/// The worked example: admin / adminPassword, GET /resource.
#[test]
fn testrealm_scenario() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));
    assert_eq!(challenge.realm, REALM);

    let header = DigestClient::new("admin", "adminPassword").authorize_with_cnonce(
        "GET",
        "/resource",
        &challenge,
        "0a4f113b",
    );
    let creds = parse_credentials(&header).expect("client header parses");
    assert_eq!(creds.nc.as_ref().map(|nc| nc.as_str()), Some("00000001"));

    let ha1 = format!("{:x}", md5::compute("admin:testrealm@example:adminPassword"));
    let ha2 = format!("{:x}", md5::compute("GET:/resource"));
    let manual = format!(
        "{:x}",
        md5::compute(format!(
            "{}:{}:00000001:0a4f113b:auth:{}",
            ha1, challenge.nonce, ha2
        ))
    );
    assert_eq!(creds.response, manual);

    let result = gate.authenticate("GET", Some(&header));
    assert_eq!(result.principal().map(|p| p.username.as_str()), Some("admin"));
}

/// A digest computed for one method does not authenticate another.
#[test]
fn method_is_bound_into_digest() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));
    let header =
        DigestClient::new("admin", "adminPassword").authorize("GET", "/resource", &challenge);
    assert_eq!(
        reason(&gate.authenticate("POST", Some(&header))),
        Some(AuthError::ResponseMismatch)
    );
}

/// A peer that keeps presenting credentials is eventually throttled.
#[test]
fn rate_limit_exhaustion_yields_429() {
    let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(3600)));
    let gate = gate().with_rate_limiter(limiter);
    let peer: IpAddr = "203.0.113.9".parse().unwrap();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let challenge = gate.challenge(false);
        let header = DigestClient::new("admin", "nope").authorize("GET", "/", &challenge);
        let mut headers = Headers::new();
        headers.push("Authorization", header);
        let request = Request::new(RequestLine::new(Method::Get, "/").unwrap(), headers);
        let result = gate.authenticate_request(&request, Some(peer));
        statuses.push(result.denial().map(|d| d.status));
    }
    assert_eq!(statuses, vec![Some(401), Some(401), Some(401), Some(429)]);

    let other: IpAddr = "203.0.113.10".parse().unwrap();
    let challenge = gate.challenge(false);
    let header = DigestClient::new("admin", "adminPassword").authorize("GET", "/", &challenge);
    let mut headers = Headers::new();
    headers.push("Authorization", header);
    let request = Request::new(RequestLine::new(Method::Get, "/").unwrap(), headers);
    assert!(gate.authenticate_request(&request, Some(other)).is_authenticated());
}

/// Many threads answering the same challenge with the same counter: one wins.
#[test]
fn concurrent_identical_requests_accept_once() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate("GET", None));
    let header = header_with_nc(&challenge, "admin", "adminPassword", 1, "race");

    let accepted = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| gate.authenticate("GET", Some(&header)).is_authenticated()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });
    assert_eq!(accepted, 1);
}

/// Async account stores go through the same checks.
#[tokio::test]
async fn async_store_flow() {
    let gate = gate();
    let challenge = challenge_from(&gate.authenticate_async("GET", None).await);
    let mut client = DigestClient::new("alice", "wonderland");

    let header = client.authorize("GET", "/resource", &challenge);
    assert!(gate.authenticate_async("GET", Some(&header)).await.is_authenticated());
    assert_eq!(
        reason(&gate.authenticate_async("GET", Some(&header)).await),
        Some(AuthError::ReplayDetected)
    );
}
