use actix_web::{http::header::HeaderValue, HttpRequest};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::server::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
const PASSWORD_ROUNDS: u32 = 20_000;
const PASSWORD_SCHEME: &str = "pbkdf2_sha256";

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Signs and checks HS256 bearer tokens carrying a user id.
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_days: i64) -> Self {
        TokenIssuer {
            secret: secret.to_vec(),
            ttl: Duration::days(ttl_days),
        }
    }

    fn mac(&self) -> Result<HmacSha256, ApiError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| ApiError::Internal(e.to_string()))
    }

    pub fn issue(&self, user_id: &str) -> Result<String, ApiError> {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        let claims = serde_json::to_vec(&claims).map_err(|e| ApiError::Internal(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(TOKEN_HEADER),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// The user id in a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Option<String> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let (signing_input, signature) = token.rsplit_once('.')?;
        let (_, claims) = signing_input.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims).ok()?).ok()?;
        (claims.exp > now.timestamp()).then_some(claims.sub)
    }
}

/// The user id behind the request's `Authorization: Bearer` header, if valid.
pub fn authenticated_user(request: &HttpRequest, tokens: &TokenIssuer) -> Option<String> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let token = authorization.strip_prefix("Bearer ")?;
    tokens.verify(token.trim())
}

/// 6–16 characters from letters, digits and `@$!%*?&`, with at least one
/// uppercase letter and one digit.
pub fn is_valid_password(password: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "@$!%*?&".contains(c);
    (6..=16).contains(&password.chars().count())
        && password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

// PBKDF2-HMAC-SHA256 with a single 32-byte block
fn derive(password: &str, salt: &[u8], rounds: u32) -> Result<Vec<u8>, ApiError> {
    let prf = HmacSha256::new_from_slice(password.as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block = mac.finalize().into_bytes();
    let mut derived = block.to_vec();

    for _ in 1..rounds {
        let mut mac = prf.clone();
        mac.update(&block);
        block = mac.finalize().into_bytes();
        derived
            .iter_mut()
            .zip(block.iter())
            .for_each(|(out, byte)| *out ^= byte);
    }
    Ok(derived)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt: [u8; 16] = rand::random();
    let derived = derive(password, &salt, PASSWORD_ROUNDS)?;
    Ok(format!(
        "{PASSWORD_SCHEME}${PASSWORD_ROUNDS}${}${}",
        hex::encode(salt),
        hex::encode(derived)
    ))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, rounds, salt, expected] = parts.as_slice() else {
        return false;
    };
    if *scheme != PASSWORD_SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), hex::decode(salt), hex::decode(expected))
    else {
        return false;
    };
    match derive(password, &salt, rounds) {
        Ok(derived) => {
            derived.len() == expected.len()
                && derived
                    .iter()
                    .zip(expected.iter())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn tokens_round_trip_until_expiry() {
        let tokens = TokenIssuer::new(b"secret", 14);
        let issued_at = Utc::now();
        let token = tokens.issue_at("user-1", issued_at).unwrap();

        assert_eq!(tokens.verify_at(&token, issued_at), Some("user-1".to_string()));
        assert_eq!(tokens.verify_at(&token, issued_at + Duration::days(15)), None);
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let tokens = TokenIssuer::new(b"secret", 14);
        let token = tokens.issue("user-1").unwrap();

        let other = TokenIssuer::new(b"another secret", 14);
        assert_eq!(other.verify(&token), None);

        let forged_claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"admin","iat":0,"exp":99999999999}"#);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(tokens.verify(&forged), None);
        assert_eq!(tokens.verify("garbage"), None);
    }

    #[test]
    fn bearer_header_is_required() {
        let tokens = TokenIssuer::new(b"secret", 14);
        let token = tokens.issue("user-7").unwrap();

        let request = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();
        assert_eq!(authenticated_user(&request, &tokens), Some("user-7".to_string()));

        let request = TestRequest::default()
            .insert_header(("Authorization", token))
            .to_http_request();
        assert_eq!(authenticated_user(&request, &tokens), None);

        let request = TestRequest::default().to_http_request();
        assert_eq!(authenticated_user(&request, &tokens), None);
    }

    #[test]
    fn password_policy() {
        assert!(is_valid_password("Secret1"));
        assert!(is_valid_password("Ab1@$!%*?&"));
        assert!(!is_valid_password("Sh0rt"));
        assert!(!is_valid_password("nouppercase1"));
        assert!(!is_valid_password("NoDigitsHere"));
        assert!(!is_valid_password("Has Space1"));
        assert!(!is_valid_password("WayTooLongPassword123"));
    }

    #[test]
    fn password_hashes_verify() {
        let stored = hash_password("Secret1").unwrap();
        assert!(stored.starts_with("pbkdf2_sha256$"));
        assert!(verify_password("Secret1", &stored));
        assert!(!verify_password("Secret2", &stored));
        assert!(!verify_password("Secret1", "plain-text"));
        assert_ne!(stored, hash_password("Secret1").unwrap());
    }

    #[test]
    fn derivation_matches_rfc_7914_vector() {
        let derived = derive("passwd", b"salt", 1).unwrap();
        assert_eq!(
            hex::encode(derived),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }
}
