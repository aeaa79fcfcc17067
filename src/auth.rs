use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

use crate::schemas::{User, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Checks identity assertions minted by the identity provider. The secret
/// is shared with the provider; the signing key is its SHA-256 digest.
pub struct IdentityVerifier {
    secret: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct IdentityAssertion {
    id: UserId,
    name: String,
    email: String,
    auth_date: String,
    hash: String,
}

impl IdentityVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Extracts and verifies the assertion carried in the Authorization
    /// header.
    pub fn verify_request(&self, request: &HttpRequest) -> Option<User> {
        let header = request
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .map(HeaderValue::to_str)?
            .ok()?;
        self.verify(header)
    }

    pub fn verify(&self, assertion: &str) -> Option<User> {
        let assertion: IdentityAssertion = serde_json::from_str(assertion).ok()?;
        let claimed = decode_hex(&assertion.hash)?;

        let mut mac = HmacSha256::new_from_slice(&signing_key(&self.secret)).ok()?;
        mac.update(signed_content(&assertion).as_bytes());
        mac.verify_slice(&claimed).ok()?;

        Some(User {
            id: assertion.id,
            display_name: assertion.name,
            email: assertion.email,
        })
    }
}

fn signing_key(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

// Fields are signed in alphabetical order, one "key=value" line each.
fn signed_content(assertion: &IdentityAssertion) -> String {
    [
        format!("authDate={}", assertion.auth_date),
        format!("email={}", assertion.email),
        format!("id={}", assertion.id),
        format!("name={}", assertion.name),
    ]
    .join("\n")
}

fn decode_hex(hash: &str) -> Option<Vec<u8>> {
    hash.chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_iter(pair), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()
}
