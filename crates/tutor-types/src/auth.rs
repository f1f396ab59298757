use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::models::{Party, Role};

/// JWT claims shared by tutor-api (REST middleware) and tutor-relay
/// (gateway authentication). Tokens are issued by the wider platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub name: String,
    pub exp: usize,
}

impl Claims {
    pub fn party(&self) -> Party {
        Party::new(self.sub, self.role)
    }
}

pub fn verify_token(token: &str, secret: &str) -> jsonwebtoken::errors::Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Mint a token. Used by tooling and tests; the service never hands tokens out.
pub fn issue_token(
    secret: &str,
    user_id: i64,
    role: Role,
    name: &str,
    ttl: chrono::Duration,
) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        name: name.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
