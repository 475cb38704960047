use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthResult};

/// Lifetime of a session cookie.
pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub exp: i64,
}

impl UserClaims {
    pub fn for_user(user_id: uuid::Uuid) -> Self {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS)).timestamp();
        Self {
            sub: user_id.to_string(),
            exp,
        }
    }

    pub fn user_id(&self) -> AuthResult<uuid::Uuid> {
        self.sub.parse().map_err(|_| AuthError::SessionSubject(self.sub.clone()))
    }
}

pub fn generate_token<K: AsRef<[u8]>>(claims: UserClaims, key: K) -> AuthResult<String> {
    let key = EncodingKey::from_secret(key.as_ref());
    Ok(jsonwebtoken::encode(&Header::default(), &claims, &key)?)
}

/// Validates signature and expiry, then resolves the user the session belongs to.
pub fn process_token<K: AsRef<[u8]>>(token: &str, key: K) -> AuthResult<uuid::Uuid> {
    let key = DecodingKey::from_secret(key.as_ref());
    let data = jsonwebtoken::decode::<UserClaims>(token, &key, &Validation::default())?;
    data.claims.user_id()
}
