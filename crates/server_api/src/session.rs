use anyhow::Context;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::{User, UserId};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> UserId {
        UserId::new(self.sub.clone())
    }
}

pub fn mint_session_token(cfg: &SessionConfig, user: &User) -> anyhow::Result<String> {
    let now = Utc::now();
    let exp = TimeDelta::try_seconds(cfg.ttl_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .with_context(|| format!("session ttl of {}s is out of range", cfg.ttl_seconds))?;
    let claims = SessionClaims {
        sub: user.id.to_string(),
        name: user.name.clone(),
        email: user.email.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_session_token(
    cfg: &SessionConfig,
    token: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId::new("410544b2-4001-4271-9855-fec4b6a6442a"),
            name: "User".into(),
            email: "user@nextmail.com".into(),
            password_hash: String::new(),
        }
    }

    #[test]
    fn minted_token_round_trips_claims() {
        let cfg = SessionConfig {
            secret: "s".into(),
            ttl_seconds: 60,
        };
        let token = mint_session_token(&cfg, &user()).expect("token");
        let claims = verify_session_token(&cfg, &token).expect("claims");
        assert_eq!(claims.user_id(), user().id);
        assert_eq!(claims.email, "user@nextmail.com");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = mint_session_token(
            &SessionConfig {
                secret: "a".into(),
                ttl_seconds: 60,
            },
            &user(),
        )
        .expect("token");
        let result = verify_session_token(
            &SessionConfig {
                secret: "b".into(),
                ttl_seconds: 60,
            },
            &token,
        );
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let cfg = SessionConfig {
            secret: "s".into(),
            ttl_seconds: i64::MAX / 10,
        };
        let err = mint_session_token(&cfg, &user()).expect_err("ttl overflow");
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn rejects_expired_token() {
        let cfg = SessionConfig {
            secret: "s".into(),
            ttl_seconds: -3600,
        };
        let token = mint_session_token(&cfg, &user()).expect("token");
        assert!(verify_session_token(&cfg, &token).is_err());
    }
}
