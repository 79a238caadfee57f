use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;
use crate::db::types::UserRole;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[cfg(test)]
    #[error("jwt encoding failed")]
    JwtEncoding,
    #[error("jwt decoding failed")]
    JwtDecoding,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Identity asserted by the upstream identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) exp: i64,
    pub(crate) role: UserRole,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) class_id: Option<String>,
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());
    validation.required_spec_claims.insert("sub".to_string());

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.security().secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| SecurityError::JwtDecoding)
}

/// Mints tokens the way the identity service does; only tests need this side.
#[cfg(test)]
pub(crate) fn create_access_token(
    claims: &Claims,
    settings: &Settings,
) -> Result<String, SecurityError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let algorithm = algorithm_from_settings(settings)?;
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .map_err(|_| SecurityError::JwtEncoding)
}

fn algorithm_from_settings(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use time::{Duration, OffsetDateTime};

    fn claims(exp: OffsetDateTime) -> Claims {
        Claims {
            sub: "student-1".to_string(),
            exp: exp.unix_timestamp(),
            role: UserRole::Student,
            name: Some("Ada".to_string()),
            class_id: Some("class-1".to_string()),
        }
    }

    #[tokio::test]
    async fn jwt_encode_decode_roundtrip() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let token = create_access_token(&claims(OffsetDateTime::now_utc() + Duration::minutes(5)), &settings)
            .expect("token");
        let decoded = verify_token(&token, &settings).expect("claims");

        assert_eq!(decoded.sub, "student-1");
        assert_eq!(decoded.role, UserRole::Student);
        assert_eq!(decoded.class_id.as_deref(), Some("class-1"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let token = create_access_token(&claims(OffsetDateTime::now_utc() - Duration::hours(1)), &settings)
            .expect("token");
        assert!(matches!(verify_token(&token, &settings), Err(SecurityError::JwtDecoding)));
    }
}
