//! Provider session tokens and the server-side cookie check

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::identity::{Identity, IdentityHandle, PendingIdentity, UserId, UserMetadata};
use crate::error::Error;

/// Prefix Supabase puts in front of base64-encoded auth cookies
const COOKIE_PREFIX: &str = "base64-";

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    #[serde(default)]
    pub refresh_token: String,

    /// The token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The expiry time in seconds
    #[serde(default)]
    pub expires_in: i64,

    /// The expiry timestamp
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// The user the session was issued for
    #[serde(default)]
    pub user: Option<IdentityHandle>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Create a new session
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: default_token_type(),
            expires_in,
            expires_at: Some(Utc::now().timestamp() + expires_in),
            user: None,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }

    /// Parse the value of the Supabase auth cookie.
    ///
    /// Accepts the `base64-` prefixed form, a raw JSON session, and the
    /// legacy `[access_token, refresh_token, ...]` array.
    pub fn from_cookie(value: &str) -> Result<Self, Error> {
        let value = value.trim();
        let json = match value.strip_prefix(COOKIE_PREFIX) {
            Some(encoded) => {
                let bytes = general_purpose::URL_SAFE_NO_PAD
                    .decode(encoded.trim_end_matches('='))
                    .or_else(|_| general_purpose::STANDARD.decode(encoded))
                    .map_err(|e| Error::auth(format!("Invalid auth cookie: {}", e)))?;
                String::from_utf8(bytes)
                    .map_err(|e| Error::auth(format!("Invalid auth cookie: {}", e)))?
            }
            None => value.to_string(),
        };

        if json.starts_with('[') {
            let parts: Vec<Option<String>> = serde_json::from_str(&json)?;
            let mut parts = parts.into_iter();
            let access_token = parts
                .next()
                .flatten()
                .ok_or_else(|| Error::auth("Auth cookie has no access token"))?;
            let refresh_token = parts.next().flatten().unwrap_or_default();
            return Ok(Self {
                access_token,
                refresh_token,
                token_type: default_token_type(),
                expires_in: 0,
                expires_at: None,
                user: None,
            });
        }

        Ok(serde_json::from_str(&json)?)
    }
}

/// Claims of a Supabase access token that matter here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

/// Read the identity out of an access token without contacting any service.
///
/// The signature is not verified: the result only decides whether a
/// server-rendered navigation is redirected to the login page. Expired
/// tokens yield `None`.
pub fn identity_from_access_token(token: &str) -> Result<Option<IdentityHandle>, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.leeway = 0;

    let claims = match jsonwebtoken::decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(&[]),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let handle = match claims.sub.and_then(UserId::new) {
        Some(id) => IdentityHandle::Authenticated(Identity {
            id,
            email: claims.email,
            metadata: claims.user_metadata.unwrap_or_default(),
        }),
        None => IdentityHandle::Pending(PendingIdentity { email: claims.email }),
    };
    Ok(Some(handle))
}

/// The identity carried by a request's auth cookie, if any
pub fn identity_from_cookie(value: &str) -> Result<Option<IdentityHandle>, Error> {
    let session = Session::from_cookie(value)?;
    identity_from_access_token(&session.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(sub: Option<&str>, exp: i64) -> String {
        let claims = json!({
            "sub": sub,
            "email": "a@x.com",
            "exp": exp,
            "aud": "authenticated",
            "role": "authenticated",
            "user_metadata": { "full_name": "Rosé" }
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    fn cookie(access_token: &str) -> String {
        let session = json!({
            "access_token": access_token,
            "refresh_token": "r1",
            "expires_in": 3600,
            "token_type": "bearer"
        });
        format!(
            "base64-{}",
            general_purpose::URL_SAFE_NO_PAD.encode(session.to_string())
        )
    }

    #[test]
    fn test_identity_from_cookie() {
        let exp = Utc::now().timestamp() + 3600;
        let handle = identity_from_cookie(&cookie(&token(Some("u1"), exp)))
            .unwrap()
            .unwrap();

        let identity = handle.identity().unwrap();
        assert_eq!(identity.id.as_str(), "u1");
        assert_eq!(identity.metadata.display_name(), Some("Rosé"));
    }

    #[test]
    fn test_expired_token_has_no_identity() {
        let exp = Utc::now().timestamp() - 60;
        assert!(identity_from_cookie(&cookie(&token(Some("u1"), exp)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_token_without_subject_is_pending() {
        let exp = Utc::now().timestamp() + 3600;
        let handle = identity_from_access_token(&token(None, exp)).unwrap().unwrap();
        assert!(handle.is_pending());
    }

    #[test]
    fn test_legacy_array_cookie() {
        let session = Session::from_cookie(r#"["access","refresh",null,null,null]"#).unwrap();
        assert_eq!(session.access_token, "access");
        assert_eq!(session.refresh_token, "refresh");
    }

    #[test]
    fn test_garbage_cookie_is_an_error() {
        assert!(identity_from_cookie("base64-%%%").is_err());
        assert!(identity_from_cookie("not a token").is_err());
    }

    #[test]
    fn test_session_expiry() {
        let session = Session::new("a".to_string(), "r".to_string(), 3600);
        assert!(!session.is_expired());
        let mut expired = session.clone();
        expired.expires_at = Some(Utc::now().timestamp() - 1);
        assert!(expired.is_expired());
    }
}
