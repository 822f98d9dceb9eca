//! Client side of the handshake: answering a challenge.

use digest_core::escape_quoted_value as escape;
use rand::{thread_rng, RngCore};
use smol_str::SmolStr;

use crate::challenge::Challenge;
use crate::credentials::{CredentialSet, NonceCount};
use crate::digest::expected_response;

/// Builds `Authorization` values for one user.
///
/// Keeps the request counter per nonce so repeated requests under the same
/// challenge carry increasing `nc` values.
#[derive(Debug, Clone)]
pub struct DigestClient {
    username: SmolStr,
    password: SmolStr,
    nonce: Option<SmolStr>,
    nc: u32,
}

impl DigestClient {
    pub fn new(username: impl Into<SmolStr>, password: impl Into<SmolStr>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            nonce: None,
            nc: 0,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Answers `challenge` with a random client nonce.
    pub fn authorize(&mut self, method: &str, uri: &str, challenge: &Challenge) -> String {
        let mut cnonce = [0u8; 8];
        thread_rng().fill_bytes(&mut cnonce);
        self.authorize_with_cnonce(method, uri, challenge, &hex::encode(cnonce))
    }

    pub fn authorize_with_cnonce(
        &mut self,
        method: &str,
        uri: &str,
        challenge: &Challenge,
        cnonce: &str,
    ) -> String {
        if self.nonce.as_ref() != Some(&challenge.nonce) {
            self.nonce = Some(challenge.nonce.clone());
            self.nc = 0;
        }
        self.nc = self.nc.wrapping_add(1);

        let (nc, cnonce) = match challenge.qop {
            Some(_) => (
                NonceCount::parse(&format!("{:08x}", self.nc)).ok(),
                Some(SmolStr::new(cnonce)),
            ),
            None => (None, None),
        };

        let mut credentials = CredentialSet {
            username: self.username.clone(),
            realm: challenge.realm.clone(),
            nonce: challenge.nonce.clone(),
            uri: SmolStr::new(uri),
            algorithm: challenge.algorithm,
            qop: challenge.qop,
            nc,
            cnonce,
            response: SmolStr::default(),
            opaque: challenge.opaque.clone(),
        };
        credentials.response = SmolStr::new(expected_response(method, &credentials, &self.password));
        render(&credentials)
    }
}

fn render(credentials: &CredentialSet) -> String {
    let mut out = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
        escape(&credentials.username),
        escape(&credentials.realm),
        escape(&credentials.nonce),
        escape(&credentials.uri),
        credentials.algorithm.as_str(),
        credentials.response
    );
    if let (Some(qop), Some(nc), Some(cnonce)) =
        (credentials.qop, &credentials.nc, &credentials.cnonce)
    {
        out.push_str(&format!(
            ", qop={}, nc={}, cnonce=\"{}\"",
            qop.as_str(),
            nc.as_str(),
            escape(cnonce)
        ));
    }
    if let Some(opaque) = &credentials.opaque {
        out.push_str(&format!(", opaque=\"{}\"", escape(opaque)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::parse_credentials;
    use crate::digest::{response_matches, Qop};

    #[test]
    fn counter_increments_per_nonce() {
        let mut client = DigestClient::new("u", "p");
        let first = Challenge::new("r", "n1");
        let a = parse_credentials(&client.authorize("GET", "/", &first)).unwrap();
        let b = parse_credentials(&client.authorize("GET", "/", &first)).unwrap();
        assert_eq!(a.nc.map(|nc| nc.value()), Some(1));
        assert_eq!(b.nc.map(|nc| nc.value()), Some(2));

        let second = Challenge::new("r", "n2");
        let c = parse_credentials(&client.authorize("GET", "/", &second)).unwrap();
        assert_eq!(c.nc.map(|nc| nc.value()), Some(1));
    }

    #[test]
    fn header_verifies_against_password() {
        let mut client = DigestClient::new("Mufasa", "Circle Of Life");
        let challenge = Challenge::new("testrealm@host.com", "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        let header = client.authorize_with_cnonce("GET", "/dir/index.html", &challenge, "0a4f113b");
        let creds = parse_credentials(&header).unwrap();
        assert_eq!(creds.qop, Some(Qop::Auth));
        assert_eq!(creds.response, "6629fae49393a05397450978507c4ef1");
        assert!(response_matches(
            &expected_response("GET", &creds, "Circle Of Life"),
            &creds.response
        ));
    }

    #[test]
    fn legacy_challenge_omits_qop_fields() {
        let mut client = DigestClient::new("u", "p");
        let mut challenge = Challenge::new("r", "n");
        challenge.qop = None;
        let header = client.authorize("GET", "/", &challenge);
        assert!(!header.contains("qop="));
        assert!(!header.contains("cnonce="));
        let creds = parse_credentials(&header).unwrap();
        assert!(creds.nc.is_none());
    }

    #[test]
    fn quotes_in_username_survive() {
        let mut client = DigestClient::new("a\"b", "p");
        let header = client.authorize("GET", "/", &Challenge::new("r", "n"));
        assert_eq!(parse_credentials(&header).unwrap().username, "a\"b");
    }
}
