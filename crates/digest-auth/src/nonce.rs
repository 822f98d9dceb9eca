//! Nonce issuance and replay tracking.
//!
//! A nonce is `hex(issued_secs) || hex(salt) || hex(mac)` where `mac` is a
//! truncated HMAC-SHA256 of the timestamp and salt under the server secret.
//! The MAC lets [`NonceManager::verify_token`] reject forged tokens without a
//! table lookup; the table itself carries the per-nonce `nc` state that
//! replay protection needs.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::{thread_rng, RngCore};
use sha2::Sha256;
use smol_str::SmolStr;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_MAX_NONCES: usize = 10_000;
const DEFAULT_CNONCE_WINDOW: usize = 64;

const TIMESTAMP_HEX: usize = 16;
const SALT_BYTES: usize = 16;
const MAC_BYTES: usize = 16;
/// Length of every token this manager issues.
pub const NONCE_LEN: usize = TIMESTAMP_HEX + 2 * SALT_BYTES + 2 * MAC_BYTES;

/// Outcome of [`NonceManager::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    /// Counter accepted and recorded.
    Fresh,
    /// Issued by us but past its TTL.
    Stale,
    /// Counter not above the last accepted one, or `(nc, cnonce)` reused.
    Replayed,
    /// Not issued by us, or already evicted.
    Unknown,
}

/// Server-side state for one issued nonce.
#[derive(Debug, Clone)]
pub struct NonceRecord {
    issued_at: Instant,
    last_nc: u32,
    used_cnonces: VecDeque<(u32, SmolStr)>,
}

impl NonceRecord {
    fn new() -> Self {
        Self {
            issued_at: Instant::now(),
            last_nc: 0,
            used_cnonces: VecDeque::new(),
        }
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn last_nc(&self) -> u32 {
        self.last_nc
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() > ttl
    }

    /// Accepts `nc` only if it moves the counter forward with an unused
    /// `(nc, cnonce)` pair. `issued_at` is never touched.
    fn advance(&mut self, nc: u32, cnonce: &str, window: usize) -> bool {
        if nc <= self.last_nc {
            return false;
        }
        // Unreachable while `last_nc` only grows; kept so a reused pair stays
        // refused even if the counter check is ever relaxed.
        if self
            .used_cnonces
            .iter()
            .any(|(seen_nc, seen)| *seen_nc == nc && seen == cnonce)
        {
            return false;
        }
        self.last_nc = nc;
        self.used_cnonces.push_back((nc, SmolStr::new(cnonce)));
        while self.used_cnonces.len() > window {
            self.used_cnonces.pop_front();
        }
        true
    }
}

/// Issues nonces and tracks their request counters.
///
/// All mutation of a record happens while holding the map's write guard for
/// that key, so two requests racing on the same `(nonce, nc)` cannot both
/// observe [`NonceStatus::Fresh`]. Requests on different nonces only contend
/// when they hash to the same shard.
pub struct NonceManager {
    records: DashMap<SmolStr, NonceRecord>,
    mac: HmacSha256,
    ttl: Duration,
    max_nonces: usize,
    cnonce_window: usize,
}

impl std::fmt::Debug for NonceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceManager")
            .field("records", &self.records.len())
            .field("ttl", &self.ttl)
            .field("max_nonces", &self.max_nonces)
            .field("cnonce_window", &self.cnonce_window)
            .finish()
    }
}

impl NonceManager {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            mac: HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size"),
            ttl,
            max_nonces: DEFAULT_MAX_NONCES,
            cnonce_window: DEFAULT_CNONCE_WINDOW,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_nonces(mut self, max: usize) -> Self {
        self.max_nonces = max.max(1);
        self
    }

    pub fn with_cnonce_window(mut self, window: usize) -> Self {
        self.cnonce_window = window.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a new nonce and records it.
    pub fn issue(&self) -> SmolStr {
        if self.records.len() >= self.max_nonces {
            self.cleanup();
            if self.records.len() >= self.max_nonces {
                self.remove_oldest((self.max_nonces / 10).max(1));
            }
        }

        let issued_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut salt = [0u8; SALT_BYTES];
        thread_rng().fill_bytes(&mut salt);

        let token = SmolStr::new(format!(
            "{:016x}{}{}",
            issued_secs,
            hex::encode(salt),
            hex::encode(self.sign(issued_secs, &salt))
        ));
        self.records.insert(token.clone(), NonceRecord::new());
        token
    }

    /// Checks that `token` has our shape and MAC. Returns the Unix issue time.
    ///
    /// This does not consult the record table.
    pub fn verify_token(&self, token: &str) -> Option<u64> {
        if token.len() != NONCE_LEN || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let (ts_hex, rest) = token.split_at(TIMESTAMP_HEX);
        let (salt_hex, mac_hex) = rest.split_at(2 * SALT_BYTES);

        let issued_secs = u64::from_str_radix(ts_hex, 16).ok()?;
        let salt = hex::decode(salt_hex).ok()?;
        let presented = hex::decode(mac_hex).ok()?;

        let expected = self.sign(issued_secs, &salt);
        if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
            Some(issued_secs)
        } else {
            None
        }
    }

    /// Atomically checks freshness and replay state for one request and, when
    /// fresh, records `nc` and `cnonce`.
    ///
    /// An expired record is left in place so every request still carrying it
    /// learns it is stale; [`cleanup`](Self::cleanup) reclaims it.
    pub fn validate(&self, nonce: &str, nc: u32, cnonce: &str) -> NonceStatus {
        if self.verify_token(nonce).is_none() {
            return NonceStatus::Unknown;
        }

        let status = match self.records.get_mut(nonce) {
            None => NonceStatus::Unknown,
            Some(mut record) => {
                if record.is_expired(self.ttl) {
                    NonceStatus::Stale
                } else if record.advance(nc, cnonce, self.cnonce_window) {
                    NonceStatus::Fresh
                } else {
                    NonceStatus::Replayed
                }
            }
        };
        debug!(?status, nc, "nonce validated");
        status
    }

    /// Drops a nonce so it can no longer be used.
    pub fn revoke(&self, nonce: &str) -> bool {
        self.records.remove(nonce).is_some()
    }

    /// Removes every expired record; returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let before = self.records.len();
        let ttl = self.ttl;
        self.records.retain(|_, record| !record.is_expired(ttl));
        before.saturating_sub(self.records.len())
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Snapshot of the record for `nonce`.
    pub fn record(&self, nonce: &str) -> Option<NonceRecord> {
        self.records.get(nonce).map(|r| r.clone())
    }

    fn remove_oldest(&self, count: usize) {
        let mut entries: Vec<_> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().issued_at))
            .collect();
        entries.sort_by_key(|(_, issued_at)| *issued_at);
        for (key, _) in entries.into_iter().take(count) {
            self.records.remove(&key);
        }
    }

    fn sign(&self, issued_secs: u64, salt: &[u8]) -> [u8; MAC_BYTES] {
        let mut mac = self.mac.clone();
        mac.update(&issued_secs.to_be_bytes());
        mac.update(salt);
        let full = mac.finalize().into_bytes();
        let mut out = [0u8; MAC_BYTES];
        out.copy_from_slice(&full[..MAC_BYTES]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn manager() -> NonceManager {
        NonceManager::new(b"test-secret", Duration::from_secs(60))
    }

    #[test]
    fn issued_tokens_verify() {
        let nonces = manager();
        let token = nonces.issue();
        assert_eq!(token.len(), NONCE_LEN);
        assert!(nonces.verify_token(&token).is_some());
        assert_eq!(nonces.count(), 1);
    }

    #[test]
    fn tokens_from_another_secret_are_unknown() {
        let ours = manager();
        let theirs = NonceManager::new(b"other-secret", Duration::from_secs(60));
        let token = theirs.issue();
        assert!(ours.verify_token(&token).is_none());
        assert_eq!(ours.validate(&token, 1, "c"), NonceStatus::Unknown);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let nonces = manager();
        let token = nonces.issue();
        let mut bytes = token.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(nonces.validate(&tampered, 1, "c"), NonceStatus::Unknown);
        assert_eq!(nonces.validate("not-a-nonce", 1, "c"), NonceStatus::Unknown);
    }

    #[test]
    fn well_formed_but_evicted_is_unknown() {
        let nonces = manager();
        let token = nonces.issue();
        assert!(nonces.revoke(&token));
        assert!(nonces.verify_token(&token).is_some());
        assert_eq!(nonces.validate(&token, 1, "c"), NonceStatus::Unknown);
    }

    #[test]
    fn counter_must_increase() {
        let nonces = manager();
        let token = nonces.issue();
        assert_eq!(nonces.validate(&token, 1, "a"), NonceStatus::Fresh);
        assert_eq!(nonces.validate(&token, 1, "a"), NonceStatus::Replayed);
        assert_eq!(nonces.validate(&token, 1, "b"), NonceStatus::Replayed);
        assert_eq!(nonces.validate(&token, 3, "a"), NonceStatus::Fresh);
        assert_eq!(nonces.validate(&token, 2, "a"), NonceStatus::Replayed);
        assert_eq!(nonces.record(&token).map(|r| r.last_nc()), Some(3));
    }

    #[test]
    fn reused_pair_is_refused_without_counter_check() {
        let mut record = NonceRecord::new();
        assert!(record.advance(1, "a", 8));

        record.last_nc = 0;
        assert!(!record.advance(1, "a", 8));
        assert!(record.advance(1, "b", 8));
        assert_eq!(record.last_nc(), 1);
    }

    #[test]
    fn zero_counter_is_never_fresh() {
        let nonces = manager();
        let token = nonces.issue();
        assert_eq!(nonces.validate(&token, 0, "a"), NonceStatus::Replayed);
    }

    #[test]
    fn cnonce_window_is_bounded() {
        let nonces = manager().with_cnonce_window(4);
        let token = nonces.issue();
        for nc in 1..=10 {
            assert_eq!(nonces.validate(&token, nc, "c"), NonceStatus::Fresh);
        }
        let record = nonces.record(&token).unwrap();
        assert_eq!(record.used_cnonces.len(), 4);
        assert_eq!(record.used_cnonces.front().map(|(nc, _)| *nc), Some(7));
    }

    #[test]
    fn expired_nonce_stays_stale_until_swept() {
        let nonces = NonceManager::new(b"s", Duration::from_millis(20));
        let token = nonces.issue();
        let issued_at = nonces.record(&token).unwrap().issued_at();
        assert_eq!(nonces.validate(&token, 1, "a"), NonceStatus::Fresh);
        assert_eq!(nonces.record(&token).unwrap().issued_at(), issued_at);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(nonces.validate(&token, 2, "a"), NonceStatus::Stale);
        assert_eq!(nonces.validate(&token, 2, "a"), NonceStatus::Stale);
        assert_eq!(nonces.validate(&token, 3, "b"), NonceStatus::Stale);
        assert_eq!(nonces.record(&token).map(|r| r.last_nc()), Some(1));

        assert_eq!(nonces.cleanup(), 1);
        assert_eq!(nonces.validate(&token, 4, "a"), NonceStatus::Unknown);
    }

    #[test]
    fn cleanup_removes_expired() {
        let nonces = NonceManager::new(b"s", Duration::from_millis(10));
        nonces.issue();
        nonces.issue();
        assert_eq!(nonces.count(), 2);

        thread::sleep(Duration::from_millis(25));
        assert_eq!(nonces.cleanup(), 2);
        assert_eq!(nonces.count(), 0);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let nonces = manager().with_max_nonces(10);
        let first = nonces.issue();
        thread::sleep(Duration::from_millis(2));
        for _ in 0..9 {
            nonces.issue();
        }
        assert_eq!(nonces.count(), 10);

        nonces.issue();
        assert_eq!(nonces.count(), 10);
        assert!(nonces.record(&first).is_none());
    }

    #[test]
    fn concurrent_same_counter_accepted_once() {
        let nonces = Arc::new(manager());
        let token = nonces.issue();
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let nonces = Arc::clone(&nonces);
                let barrier = Arc::clone(&barrier);
                let token = token.clone();
                thread::spawn(move || {
                    barrier.wait();
                    nonces.validate(&token, 1, "race")
                })
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|status| *status == NonceStatus::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }
}
