use anyhow::Context;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use shared::domain::User;
use storage::Storage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{session::mint_session_token, validation::FormPayload, ApiContext};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong.";

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInStrategy {
    Credentials,
}

/// Failure kinds a provider reports for a rejected sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    CredentialsSignin,
    CallbackRouteError,
    AccessDenied,
    Configuration,
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("sign-in rejected: {0:?}")]
    Auth(AuthErrorKind),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(
        &self,
        strategy: SignInStrategy,
        form: &FormPayload,
    ) -> Result<User, SignInError>;
}

/// Email/password sign-in against the `users` table.
#[derive(Clone)]
pub struct CredentialsProvider {
    storage: Storage,
}

impl CredentialsProvider {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AuthProvider for CredentialsProvider {
    async fn sign_in(
        &self,
        strategy: SignInStrategy,
        form: &FormPayload,
    ) -> Result<User, SignInError> {
        let SignInStrategy::Credentials = strategy;

        let (Some(email), Some(password)) = (form.get("email"), form.get("password")) else {
            return Err(SignInError::Auth(AuthErrorKind::CredentialsSignin));
        };
        if !looks_like_email(email) || password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SignInError::Auth(AuthErrorKind::CredentialsSignin));
        }

        let user = self
            .storage
            .user_by_email(email)
            .await
            .map_err(|error| {
                warn!(%error, "user lookup failed during sign-in");
                SignInError::Auth(AuthErrorKind::CallbackRouteError)
            })?
            .ok_or(SignInError::Auth(AuthErrorKind::CredentialsSignin))?;

        let parsed = PasswordHash::new(&user.password_hash).map_err(|error| {
            warn!(%error, user_id = %user.id, "stored password hash is malformed");
            SignInError::Auth(AuthErrorKind::CallbackRouteError)
        })?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| SignInError::Auth(AuthErrorKind::CredentialsSignin))?;

        Ok(user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    SignedIn { user_id: String, token: String },
    Rejected { message: &'static str },
}

/// Runs a credentials sign-in. Known auth failures become a user-facing
/// message; anything else is returned as an error.
pub async fn authenticate(ctx: &ApiContext, form: &FormPayload) -> anyhow::Result<AuthOutcome> {
    match ctx.auth.sign_in(SignInStrategy::Credentials, form).await {
        Ok(user) => {
            let token =
                mint_session_token(&ctx.sessions, &user).context("failed to mint session token")?;
            info!(user_id = %user.id, "user signed in");
            Ok(AuthOutcome::SignedIn {
                user_id: user.id.0,
                token,
            })
        }
        Err(SignInError::Auth(kind)) => {
            let message = match kind {
                AuthErrorKind::CredentialsSignin => INVALID_CREDENTIALS,
                _ => SOMETHING_WENT_WRONG,
            };
            info!(?kind, "sign-in rejected");
            Ok(AuthOutcome::Rejected { message })
        }
        Err(SignInError::Other(error)) => Err(error),
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|error| anyhow::anyhow!("failed to hash password: {error}"))?;
    Ok(hash.to_string())
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
