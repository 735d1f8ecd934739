use crate::errors::{AppError, AppResult};
use crate::models::all_models::UserRole;
use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Issuer stamped into, and required on, every token.
pub const ISSUER: &str = "jobly";

/// Structure representing JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature checked out but the expiry has passed. The decoded claims are
    /// kept so a caller can still see whose token it was.
    #[error("token has expired")]
    Expired(Box<Claims>),

    #[error("invalid token claims: {0}")]
    Invalid(String),
}

/// Issues, validates and refreshes HS256 tokens with one shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Signing("signing secret is empty".to_string()));
        }

        // Expiry is checked by hand so that an expired token still yields its claims.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[ISSUER]);

        Ok(TokenService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn claims_for(
        &self,
        id: Uuid,
        name: &str,
        email: &str,
        role: UserRole,
        ttl: Duration,
    ) -> Result<Claims, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing(format!("token lifetime {} is out of range", ttl)))?;
        Ok(Claims {
            sub: id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Generates an access/refresh pair for a user
    pub fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> Result<TokenPair, TokenError> {
        let access = self.claims_for(user_id, name, email, role, self.access_ttl)?;
        let refresh = self.claims_for(user_id, name, email, role, self.refresh_ttl)?;

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Validates a token and extracts the user information
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::Base64(_) => TokenError::Malformed(e.to_string()),
                _ => TokenError::Invalid(e.to_string()),
            },
        )?;

        let claims = token_data.claims;
        if claims.exp < Utc::now().timestamp() {
            return Err(TokenError::Expired(Box::new(claims)));
        }

        Ok(claims)
    }

    /// Mints a new access token from a still-valid refresh token.
    ///
    /// The refresh token itself is not rotated.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.validate(refresh_token)?;
        let fresh = self.claims_for(
            claims.sub,
            &claims.name,
            &claims.email,
            claims.role,
            self.access_ttl,
        )?;
        self.sign(&fresh)
    }
}

/// Verified identity attached to a request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        }
    }
}

impl AuthUser {
    pub fn require_role(&self, required: UserRole) -> AppResult<()> {
        match (required, self.role) {
            (UserRole::Admin, UserRole::Admin) | (UserRole::User, UserRole::User) => Ok(()),
            (UserRole::Admin, UserRole::User) => {
                Err(AppError::forbidden("Admin access required"))
            }
            (UserRole::User, UserRole::Admin) => {
                Err(AppError::forbidden("Only job seekers can do this"))
            }
        }
    }

    pub fn require_owner(&self, owner_id: Uuid) -> AppResult<()> {
        if self.id == owner_id {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not own this resource"))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // The auth middleware always inserts an identity before a handler runs.
        let user = req
            .extensions()
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::internal("request reached a handler without an identity"));
        ready(user)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SECRET: &str = "test-signing-secret";

    pub(crate) fn service() -> TokenService {
        TokenService::new(SECRET, Duration::minutes(15), Duration::days(30)).unwrap()
    }

    /// Signs claims for `role` that expired `seconds_ago` seconds in the past.
    pub(crate) fn expired_token(tokens: &TokenService, role: UserRole, seconds_ago: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role,
            iss: ISSUER.into(),
            iat: now - 3600,
            exp: now - seconds_ago,
        };
        tokens.sign(&claims).unwrap()
    }

    fn tamper(token: &str) -> String {
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let payload = &mut parts[1];
        let idx = payload.len() / 2;
        let replacement = if &payload[idx..idx + 1] == "A" { "B" } else { "A" };
        payload.replace_range(idx..idx + 1, replacement);
        parts.join(".")
    }

    #[test]
    fn issued_access_token_validates_to_the_same_identity() {
        let tokens = service();
        let id = Uuid::new_v4();
        let pair = tokens.issue(id, "Ada", "ada@example.com", UserRole::Admin).unwrap();

        let claims = tokens.validate(&pair.access_token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.name, "Ada");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.iss, ISSUER);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let tokens = service();
        let pair = tokens.issue(Uuid::new_v4(), "Ada", "ada@example.com", UserRole::User).unwrap();
        let access = tokens.validate(&pair.access_token).unwrap();
        let refresh = tokens.validate(&pair.refresh_token).unwrap();
        assert!(refresh.exp - access.exp >= Duration::days(29).num_seconds());
    }

    #[test]
    fn past_expiry_is_reported_as_expired_with_claims() {
        let tokens = service();
        let token = expired_token(&tokens, UserRole::User, 1);
        match tokens.validate(&token) {
            Err(TokenError::Expired(claims)) => assert_eq!(claims.email, "ada@example.com"),
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tokens = service();
        let pair = tokens.issue(Uuid::new_v4(), "Ada", "ada@example.com", UserRole::User).unwrap();
        let result = tokens.validate(&tamper(&pair.access_token));
        assert!(matches!(
            result,
            Err(TokenError::Malformed(_)) | Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn garbage_and_foreign_tokens_are_malformed() {
        let tokens = service();
        assert!(matches!(tokens.validate("not.a.jwt"), Err(TokenError::Malformed(_))));
        assert!(matches!(tokens.validate(""), Err(TokenError::Malformed(_))));

        let other = TokenService::new("another-secret", Duration::minutes(15), Duration::days(30)).unwrap();
        let pair = other.issue(Uuid::new_v4(), "Ada", "ada@example.com", UserRole::User).unwrap();
        assert!(matches!(tokens.validate(&pair.access_token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn unexpected_claims_are_invalid() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let foreign_role = serde_json::json!({
            "sub": Uuid::new_v4(),
            "name": "Ada",
            "email": "ada@example.com",
            "role": "superuser",
            "iss": ISSUER,
            "iat": now,
            "exp": now + 600,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &foreign_role,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(tokens.validate(&token), Err(TokenError::Invalid(_))));

        let wrong_issuer = Claims {
            sub: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: UserRole::User,
            iss: "someone-else".into(),
            iat: now,
            exp: now + 600,
        };
        let token = tokens.sign(&wrong_issuer).unwrap();
        assert!(matches!(tokens.validate(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refresh_mints_a_valid_access_token_for_the_same_user() {
        let tokens = service();
        let id = Uuid::new_v4();
        let pair = tokens.issue(id, "Ada", "ada@example.com", UserRole::User).unwrap();

        let fresh = tokens.refresh(&pair.refresh_token).unwrap();
        let claims = tokens.validate(&fresh).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.name, "Ada");
        assert_eq!(claims.role, UserRole::User);
        assert!(claims.exp <= Utc::now().timestamp() + Duration::minutes(15).num_seconds());
    }

    #[test]
    fn expired_refresh_token_cannot_refresh() {
        let tokens = service();
        let refresh = expired_token(&tokens, UserRole::User, 1);
        assert!(matches!(tokens.refresh(&refresh), Err(TokenError::Expired(_))));
    }

    #[test]
    fn empty_secret_is_a_signing_error() {
        let result = TokenService::new("", Duration::minutes(15), Duration::days(30));
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn unrepresentable_lifetime_fails_instead_of_panicking() {
        let tokens =
            TokenService::new(SECRET, Duration::minutes(15), Duration::days(100_000_000)).unwrap();
        let result = tokens.issue(Uuid::new_v4(), "Ada", "ada@example.com", UserRole::User);
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn role_checks_are_exact() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role: UserRole::User,
        };
        assert!(user.require_role(UserRole::User).is_ok());
        assert!(matches!(user.require_role(UserRole::Admin), Err(AppError::Forbidden(_))));
        assert!(user.require_owner(user.id).is_ok());
        assert!(matches!(user.require_owner(Uuid::new_v4()), Err(AppError::Forbidden(_))));
    }
}
