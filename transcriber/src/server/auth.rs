//! Token authentication. A server started without `--token-file` accepts
//! everyone; one started with a token requires it on `auth` or on
//! `start_stream`'s inline `token` field, except that an unauthenticated
//! client may still `ping` from localhost.

use std::net::IpAddr;

pub fn check_token(expected: &Option<String>, provided: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => provided.is_some_and(|t| t == expected),
    }
}

pub fn ping_allowed_unauthenticated(peer_ip: IpAddr) -> bool {
    peer_ip.is_loopback()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expected_token_accepts_anything() {
        assert!(check_token(&None, None));
        assert!(check_token(&None, Some("whatever")));
    }

    #[test]
    fn expected_token_requires_exact_match() {
        let expected = Some("secret".to_string());
        assert!(check_token(&expected, Some("secret")));
        assert!(!check_token(&expected, Some("wrong")));
        assert!(!check_token(&expected, None));
    }

    #[test]
    fn ping_allowed_only_from_loopback() {
        assert!(ping_allowed_unauthenticated("127.0.0.1".parse().unwrap()));
        assert!(ping_allowed_unauthenticated("::1".parse().unwrap()));
        assert!(!ping_allowed_unauthenticated("203.0.113.5".parse().unwrap()));
    }
}
