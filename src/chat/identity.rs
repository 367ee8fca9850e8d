//! Username-based sign-in on top of an identity provider that only knows
//! address-shaped identifiers.

use tracing::warn;

use crate::{
    backend::Auth,
    model::{ProfileAttributes, Session},
};

use super::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_DOMAIN: &str = "example.com";

/// Maps a username into the synthetic address the identity provider expects.
pub fn identifier_for(username: &str, domain: &str) -> String {
    format!("{}@{domain}", username.trim().to_lowercase())
}

pub fn validate_sign_up(
    full_name: &str,
    username: &str,
    password: &str,
) -> Result<(), AuthError> {
    if username.contains('@') {
        return Err(AuthError::InvalidUsername);
    }
    if username.trim().is_empty() {
        return Err(AuthError::EmptyUsername);
    }
    if full_name.trim().is_empty() {
        return Err(AuthError::EmptyFullName);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

pub async fn sign_in<A: Auth + ?Sized>(
    auth: &A,
    domain: &str,
    username: &str,
    password: &str,
) -> Result<Session, AuthError> {
    if username.trim().is_empty() {
        return Err(AuthError::EmptyUsername);
    }
    let identifier = identifier_for(username, domain);
    auth.sign_in(&identifier, password).await.inspect_err(|e| {
        if let AuthError::Backend(e) = e {
            warn!("sign in for {identifier} failed: {e:#}");
        }
    })
}

/// Validates locally first; nothing reaches the provider for a rejected form.
pub async fn sign_up<A: Auth + ?Sized>(
    auth: &A,
    domain: &str,
    full_name: &str,
    username: &str,
    password: &str,
) -> Result<Session, AuthError> {
    validate_sign_up(full_name, username, password)?;

    let identifier = identifier_for(username, domain);
    let attributes = ProfileAttributes {
        username: username.trim().to_owned(),
        full_name: full_name.trim().to_owned(),
    };
    auth.sign_up(&identifier, password, attributes)
        .await
        .inspect_err(|e| {
            if let AuthError::Backend(e) = e {
                warn!("sign up for {identifier} failed: {e:#}");
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::FakeBackend;

    #[test]
    fn identifier_is_trimmed_and_lowercased() {
        assert_eq!(identifier_for("  Ada ", DEFAULT_DOMAIN), "ada@example.com");
    }

    #[test]
    fn sign_up_validation() {
        assert!(matches!(
            validate_sign_up("Bad", "bad@name", "secret1"),
            Err(AuthError::InvalidUsername)
        ));
        assert!(matches!(
            validate_sign_up("Nobody", "   ", "secret1"),
            Err(AuthError::EmptyUsername)
        ));
        assert!(matches!(
            validate_sign_up("", "ada", "secret1"),
            Err(AuthError::EmptyFullName)
        ));
        assert!(matches!(
            validate_sign_up("Ada", "ada", "short"),
            Err(AuthError::WeakPassword(MIN_PASSWORD_LEN))
        ));
        assert!(validate_sign_up("Ada", "ada", "secret1").is_ok());
    }

    #[tokio::test]
    async fn rejected_username_never_reaches_the_provider() {
        let backend = FakeBackend::new();
        let result = sign_up(&backend, DEFAULT_DOMAIN, "Bad Name", "bad@name", "secret1").await;

        assert!(matches!(result, Err(AuthError::InvalidUsername)));
        assert_eq!(backend.calls().await.sign_ups, 0);
    }

    #[tokio::test]
    async fn accepted_sign_up_uses_derived_identifier() {
        let backend = FakeBackend::new();
        sign_up(&backend, DEFAULT_DOMAIN, " Ada ", " Ada ", "secret1")
            .await
            .unwrap();

        let calls = backend.calls().await;
        assert_eq!(calls.sign_ups, 1);
        assert_eq!(calls.last_identifier.as_deref(), Some("ada@example.com"));
    }
}
