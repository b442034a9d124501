//! JWT issuance and verification (HS256)

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gatehouse_storage::UserRecord;

use crate::error::AuthResult;

/// Accepted clock skew between gateway and clients
const LEEWAY_SECS: u64 = 60;

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub name: String,
    /// Provider the user authenticated through
    pub provider: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
    pub jti: String,
}

/// Signs and verifies access tokens with a shared HMAC secret
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user: &UserRecord) -> AuthResult<(String, Claims)> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            provider: user.provider_id.clone().unwrap_or_default(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            token_type: "access".to_string(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> UserRecord {
        UserRecord {
            user_id: "u-42".to_string(),
            email: "dev@x.example".to_string(),
            display_name: "Dev".to_string(),
            provider_id: Some("google".to_string()),
            subject: Some("sub".to_string()),
            enabled: true,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let signer = TokenSigner::new(b"test-secret", Duration::from_secs(3600));
        let (token, issued) = signer.issue(&user()).unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-42");
        assert_eq!(claims.email, "dev@x.example");
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = TokenSigner::new(b"secret-a", Duration::from_secs(3600));
        let (token, _) = signer.issue(&user()).unwrap();
        let other = TokenSigner::new(b"secret-b", Duration::from_secs(3600));
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // TTL of zero plus leeway means the token expires 60s ago at the
        // earliest verification boundary; fake it by issuing in the past.
        let signer = TokenSigner::new(b"secret", Duration::from_secs(0));
        let mut claims = signer.issue(&user()).unwrap().1;
        claims.exp = Utc::now().timestamp() - 120;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(signer.verify(&token).is_err());
    }
}
