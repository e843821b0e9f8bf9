use super::model::{AuthenticatedUser, Role};
use crate::core::config::AuthConfig;
use crate::core::error::AppError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

/// Verifies bearer tokens minted by the upstream identity provider
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    #[serde(rename = "exp")]
    _exp: u64,
}

impl JwtValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.jwt_leeway.as_secs();
        validation.validate_nbf = true;

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        let claims = token_data.claims;
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a valid id".to_string()))?;

        Ok(AuthenticatedUser {
            id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::time::Duration;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        role: &'a str,
        exp: u64,
    }

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            issuer: None,
            audience: None,
            jwt_leeway: Duration::from_secs(0),
        }
    }

    fn token(secret: &str, sub: &str, role: &str) -> String {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64;
        encode(
            &Header::default(),
            &TestClaims { sub, role, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_token_extracts_identity() {
        let validator = JwtValidator::new(&auth_config());
        let id = Uuid::new_v4();

        let user = validator
            .validate_token(&token("test-secret", &id.to_string(), "MANAGER"))
            .unwrap();

        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Manager);
    }

    #[test]
    fn test_validate_token_rejects_wrong_secret() {
        let validator = JwtValidator::new(&auth_config());
        let result =
            validator.validate_token(&token("other-secret", &Uuid::new_v4().to_string(), "USER"));

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_validate_token_rejects_non_uuid_subject() {
        let validator = JwtValidator::new(&auth_config());
        let result = validator.validate_token(&token("test-secret", "not-a-uuid", "USER"));

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
