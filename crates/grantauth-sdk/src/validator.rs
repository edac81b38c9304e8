//! Credential freshness checks.
//!
//! The coordinator cannot verify the issuer's signature; it only reads the
//! token body to decide whether a cached credential is still worth using.
//! Every check fails closed: anything that cannot be decoded is invalid.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use grantauth_models::{Credential, CredentialClaims};

use crate::error::ValidationError;

/// Decode the claims segment of a JWT-shaped token.
pub fn decode_claims(token: &str) -> Result<CredentialClaims, ValidationError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(body), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ValidationError::Malformed("expected three segments"));
    };
    if body.is_empty() {
        return Err(ValidationError::Malformed("empty claims segment"));
    }
    let bytes = URL_SAFE_NO_PAD.decode(body.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Whether `credential` is decodable and unexpired at `now`.
pub fn is_valid_at(credential: &Credential, now: DateTime<Utc>) -> bool {
    match decode_claims(&credential.token) {
        Ok(claims) => !claims.is_expired_at(now),
        Err(_) => false,
    }
}

/// Whether `credential` is decodable and unexpired right now.
pub fn is_valid(credential: &Credential) -> bool {
    is_valid_at(credential, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use grantauth_models::IdentityKind;

    fn token_with_body(body: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(body.to_string());
        format!("{header}.{body}.c2ln")
    }

    fn cred(token: String) -> Credential {
        Credential::new(token, IdentityKind::ExternallyOwned)
    }

    #[test]
    fn unexpired_token_is_valid() {
        let now = Utc::now();
        let exp = (now + TimeDelta::hours(1)).timestamp();
        let token = token_with_body(&serde_json::json!({ "sub": "0xabc", "exp": exp }));
        assert!(is_valid_at(&cred(token.clone()), now));
        assert_eq!(decode_claims(&token).unwrap().exp, exp);
    }

    #[test]
    fn expired_token_is_invalid() {
        let now = Utc::now();
        let exp = (now - TimeDelta::seconds(1)).timestamp();
        let token = token_with_body(&serde_json::json!({ "exp": exp }));
        assert!(!is_valid_at(&cred(token), now));
    }

    #[test]
    fn expiry_at_now_is_invalid() {
        let now = Utc::now();
        let token = token_with_body(&serde_json::json!({ "exp": now.timestamp() }));
        assert!(!is_valid_at(&cred(token), now));
    }

    #[test]
    fn opaque_token_fails_closed() {
        assert!(!is_valid(&cred("tok1".into())));
        assert!(matches!(
            decode_claims("tok1"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn garbage_body_fails_closed() {
        assert!(!is_valid(&cred("aaa.!!!.ccc".into())));
        assert!(matches!(
            decode_claims("aaa.!!!.ccc"),
            Err(ValidationError::Base64(_))
        ));
    }

    #[test]
    fn body_without_exp_fails_closed() {
        let token = token_with_body(&serde_json::json!({ "sub": "0xabc" }));
        assert!(!is_valid(&cred(token.clone())));
        assert!(matches!(decode_claims(&token), Err(ValidationError::Claims(_))));
    }

    #[test]
    fn padded_body_is_accepted() {
        let exp = (Utc::now() + TimeDelta::hours(1)).timestamp();
        let body = base64::engine::general_purpose::URL_SAFE
            .encode(serde_json::json!({ "exp": exp }).to_string());
        let token = format!("h.{body}.s");
        assert_eq!(decode_claims(&token).unwrap().exp, exp);
    }

    #[test]
    fn extra_segments_are_malformed() {
        assert!(matches!(
            decode_claims("a.b.c.d"),
            Err(ValidationError::Malformed(_))
        ));
    }
}
