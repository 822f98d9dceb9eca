use digest_auth::{parse_credentials, Account, DigestClient, DigestGate, MemoryAccountStore};
use proptest::prelude::*;

proptest! {
    /// Arbitrary input yields a credential set or a ParseError.
    #[test]
    fn parse_credentials_never_panics(input in "\\PC{0,512}") {
        let _ = parse_credentials(&input);
    }

    /// Same, with the scheme prefix in place so the splitter is reached.
    #[test]
    fn parse_credentials_with_scheme_never_panics(rest in "\\PC{0,512}") {
        let _ = parse_credentials(&format!("Digest {}", rest));
    }

    /// Any printable username and password, quotes and backslashes included,
    /// authenticates through a client-built header; a different password never does.
    #[test]
    fn client_headers_authenticate(
        username in "[a-zA-Z0-9 @._\"\\\\-]{1,24}",
        password in "[ -~]{0,24}",
    ) {
        let store = MemoryAccountStore::new().with(Account::new(username.as_str(), password.as_str()));
        let gate = DigestGate::new("property realm", b"property-secret", store);

        let challenge = gate.challenge(false);
        let mut client = DigestClient::new(username.as_str(), password.as_str());
        let header = client.authorize("GET", "/p", &challenge);
        let result = gate.authenticate("GET", Some(&header));
        prop_assert!(result.is_authenticated(), "rejected: {}", header);

        let challenge = gate.challenge(false);
        let wrong = format!("{}x", password);
        let header = DigestClient::new(username.as_str(), wrong.as_str())
            .authorize("GET", "/p", &challenge);
        prop_assert!(!gate.authenticate("GET", Some(&header)).is_authenticated());
    }
}
