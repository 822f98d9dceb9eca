use std::fmt;

use digest_core::escape_quoted_value as escape;
use digest_parse::parse_www_authenticate_header;
use smol_str::SmolStr;

use crate::digest::{DigestAlgorithm, Qop};

/// One `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: SmolStr,
    pub nonce: SmolStr,
    pub algorithm: DigestAlgorithm,
    /// `None` only when parsed from a legacy RFC 2069 server.
    pub qop: Option<Qop>,
    pub opaque: Option<SmolStr>,
    pub stale: bool,
}

impl Challenge {
    pub fn new(realm: impl Into<SmolStr>, nonce: impl Into<SmolStr>) -> Self {
        Self {
            realm: realm.into(),
            nonce: nonce.into(),
            algorithm: DigestAlgorithm::Md5,
            qop: Some(Qop::Auth),
            opaque: None,
            stale: false,
        }
    }

    /// Parses a `WWW-Authenticate` value.
    ///
    /// A `qop` list is accepted when it offers `auth`.
    pub fn parse(value: &str) -> Option<Self> {
        let header = parse_www_authenticate_header(value)?;
        if !header.scheme().eq_ignore_ascii_case("Digest") {
            return None;
        }

        let algorithm = match header.param("algorithm") {
            Some(alg) => DigestAlgorithm::parse(alg)?,
            None => DigestAlgorithm::Md5,
        };
        let qop = match header.param("qop") {
            Some(list) => Some(list.split(',').find_map(|q| Qop::parse(q.trim()))?),
            None => None,
        };

        Some(Self {
            realm: header.param("realm")?.clone(),
            nonce: header.param("nonce")?.clone(),
            algorithm,
            qop,
            opaque: header.param("opaque").cloned(),
            stale: header
                .param("stale")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest realm=\"{}\", nonce=\"{}\", algorithm={}",
            escape(&self.realm),
            escape(&self.nonce),
            self.algorithm.as_str()
        )?;
        if let Some(qop) = self.qop {
            write!(f, ", qop=\"{}\"", qop.as_str())?;
        }
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", escape(opaque))?;
        }
        if self.stale {
            f.write_str(", stale=true")?;
        }
        Ok(())
    }
}
