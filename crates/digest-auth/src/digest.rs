//! Response digest computation (RFC 2617 §3.2.2.1).

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::credentials::CredentialSet;

/// Hash named by the `algorithm` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Case-insensitive. `-sess` variants are not supported.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Some(DigestAlgorithm::Md5),
            "SHA-256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Lower-hex digest of `data`.
    pub fn hash(&self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

/// Quality of protection. Only `auth` is implemented; `auth-int` would also
/// hash the entity body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
}

impl Qop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qop::Auth => "auth",
        }
    }

    /// Exact match: the token is hashed as sent, so `AUTH` is not `auth`.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "auth" {
            Some(Qop::Auth)
        } else {
            None
        }
    }
}

/// `H(username:realm:secret)`
pub fn ha1(algorithm: DigestAlgorithm, username: &str, realm: &str, secret: &str) -> String {
    algorithm.hash(format!("{}:{}:{}", username, realm, secret).as_bytes())
}

/// `H(method:uri)`
pub fn ha2(algorithm: DigestAlgorithm, method: &str, uri: &str) -> String {
    algorithm.hash(format!("{}:{}", method, uri).as_bytes())
}

/// Response a client holding `secret` would have produced for `credentials`.
///
/// With `qop=auth` this is `H(HA1:nonce:nc:cnonce:qop:HA2)`; without qop the
/// RFC 2069 form `H(HA1:nonce:HA2)`. The `nc` string is used exactly as the
/// client sent it.
pub fn expected_response(method: &str, credentials: &CredentialSet, secret: &str) -> String {
    let algorithm = credentials.algorithm;
    let ha1 = ha1(
        algorithm,
        &credentials.username,
        &credentials.realm,
        secret,
    );
    let ha2 = ha2(algorithm, method, &credentials.uri);

    let input = match (credentials.qop, &credentials.nc, &credentials.cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => format!(
            "{}:{}:{}:{}:{}:{}",
            ha1,
            credentials.nonce,
            nc.as_str(),
            cnonce,
            qop.as_str(),
            ha2
        ),
        _ => format!("{}:{}:{}", ha1, credentials.nonce, ha2),
    };
    algorithm.hash(input.as_bytes())
}

/// Constant-time comparison of a computed digest with the presented one.
///
/// Hex case in the presented value is ignored.
pub fn response_matches(expected: &str, presented: &str) -> bool {
    let presented = presented.to_ascii_lowercase();
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
