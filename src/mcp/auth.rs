//! Bearer-token authentication for the HTTP and SSE transports.
//!
//! Tokens are JWTs verified against either a symmetric secret (HS
//! family) or an asymmetric public key (RSA, ECDSA or Ed25519). The
//! permitted signing algorithms are derived from the key type, so a
//! token signed with anything outside that family is rejected outright
//! rather than handed to the verifier.
//!
//! The stdio transport never authenticates.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::config::read_bool_env;
use crate::error::ConfigError;
use crate::mcp::protocol::ErrorDetail;

/// Environment-driven authentication settings.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Whether bearer auth is enforced on protected transports.
    pub enabled: bool,
    /// Symmetric HS256/384/512 key.
    pub jwt_secret: String,
    /// PEM-encoded RSA, ECDSA or Ed25519 public key.
    pub jwt_public_key: String,
    /// Required `aud` claim, when non-empty.
    pub audience: String,
    /// Required `iss` claim, when non-empty.
    pub issuer: String,
}

impl AuthConfig {
    /// Reads the `MCP_AUTH_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let trimmed = |key: &str| {
            std::env::var(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            enabled: read_bool_env("MCP_AUTH_ENABLED"),
            jwt_secret: trimmed("MCP_AUTH_JWT_SECRET"),
            jwt_public_key: trimmed("MCP_AUTH_JWT_PUBLIC_KEY"),
            audience: trimmed("MCP_AUTH_AUDIENCE"),
            issuer: trimmed("MCP_AUTH_ISSUER"),
        }
    }

    /// Checks that exactly one key source is set when auth is enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when enabled with zero or two key
    /// sources.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.jwt_secret.is_empty() && self.jwt_public_key.is_empty() {
            return Err(ConfigError::MissingKeySource);
        }
        if !self.jwt_secret.is_empty() && !self.jwt_public_key.is_empty() {
            return Err(ConfigError::ConflictingKeySources);
        }
        Ok(())
    }
}

/// Validates bearer tokens on protected transports.
pub struct Authenticator {
    enabled: bool,
    key: Option<DecodingKey>,
    algorithms: Vec<Algorithm>,
    audience: String,
    issuer: String,
}

impl Authenticator {
    /// Builds an authenticator from validated settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for invalid settings or an
    /// unsupported public key.
    pub fn new(config: AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if !config.enabled {
            return Ok(Self {
                enabled: false,
                key: None,
                algorithms: Vec::new(),
                audience: config.audience,
                issuer: config.issuer,
            });
        }

        let (key, algorithms) = if config.jwt_secret.is_empty() {
            decoding_key_from_pem(&config.jwt_public_key)?
        } else {
            (
                DecodingKey::from_secret(config.jwt_secret.as_bytes()),
                vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            )
        };

        Ok(Self {
            enabled: true,
            key: Some(key),
            algorithms,
            audience: config.audience,
            issuer: config.issuer,
        })
    }

    /// Builds an authenticator from the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the environment settings are
    /// invalid; callers keep that error as the sticky failure.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(AuthConfig::from_env())
    }

    /// Whether auth is enforced.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Validates the `Authorization` header value of a request.
    ///
    /// # Errors
    ///
    /// Returns an unauthorized [`ErrorDetail`] with one of the stable
    /// messages: "missing bearer token", "invalid authorization
    /// header", "invalid token", "invalid audience", "invalid issuer".
    pub fn validate_bearer(&self, authorization: Option<&str>) -> Result<(), ErrorDetail> {
        if !self.enabled {
            return Ok(());
        }

        let header = authorization.map(str::trim).unwrap_or_default();
        if header.is_empty() {
            return Err(ErrorDetail::unauthorized("missing bearer token"));
        }
        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
            return Err(ErrorDetail::unauthorized("invalid authorization header"));
        }
        let token = parts[1];
        if token.is_empty() {
            return Err(ErrorDetail::unauthorized("missing bearer token"));
        }

        let (Some(key), Some(first)) = (self.key.as_ref(), self.algorithms.first()) else {
            return Err(ErrorDetail::unauthorized("invalid token"));
        };
        let mut validation = Validation::new(*first);
        validation.algorithms = self.algorithms.clone();
        validation.validate_aud = false;
        validation.required_spec_claims = std::collections::HashSet::new();

        let claims = decode::<serde_json::Map<String, Value>>(token, key, &validation)
            .map_err(|_| ErrorDetail::unauthorized("invalid token"))?
            .claims;

        if !self.audience.is_empty() && !audience_matches(claims.get("aud"), &self.audience) {
            return Err(ErrorDetail::unauthorized("invalid audience"));
        }
        if !self.issuer.is_empty() {
            let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
            if issuer != self.issuer {
                return Err(ErrorDetail::unauthorized("invalid issuer"));
            }
        }
        Ok(())
    }
}

/// Parses a public key PEM and derives the permitted algorithm family.
fn decoding_key_from_pem(pem: &str) -> Result<(DecodingKey, Vec<Algorithm>), ConfigError> {
    let bytes = pem.as_bytes();
    if let Ok(key) = DecodingKey::from_rsa_pem(bytes) {
        return Ok((
            key,
            vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
        ));
    }
    if let Ok(key) = DecodingKey::from_ec_pem(bytes) {
        return Ok((key, vec![Algorithm::ES256, Algorithm::ES384]));
    }
    if let Ok(key) = DecodingKey::from_ed_pem(bytes) {
        return Ok((key, vec![Algorithm::EdDSA]));
    }
    Err(ConfigError::UnsupportedPublicKey)
}

/// Matches the `aud` claim against the configured audience: a plain
/// string must equal it, an array must contain it.
fn audience_matches(claim: Option<&Value>, audience: &str) -> bool {
    match claim {
        Some(Value::String(value)) => value == audience,
        Some(Value::Array(entries)) => entries
            .iter()
            .any(|entry| entry.as_str() == Some(audience)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    // Far enough in the future to outlive any test run.
    const FAR_FUTURE: u64 = 4_102_444_800;

    fn secret_auth() -> Authenticator {
        Authenticator::new(AuthConfig {
            enabled: true,
            jwt_secret: "sandbox-secret".to_string(),
            ..AuthConfig::default()
        })
        .expect("authenticator")
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token")
    }

    #[test]
    fn disabled_config_needs_no_keys() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        let auth = Authenticator::new(config).expect("authenticator");
        assert!(!auth.enabled());
        assert!(auth.validate_bearer(None).is_ok());
    }

    #[test]
    fn enabled_config_requires_exactly_one_key() {
        let missing = AuthConfig {
            enabled: true,
            ..AuthConfig::default()
        };
        assert!(matches!(
            missing.validate(),
            Err(ConfigError::MissingKeySource)
        ));

        let both = AuthConfig {
            enabled: true,
            jwt_secret: "a".to_string(),
            jwt_public_key: "b".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(
            both.validate(),
            Err(ConfigError::ConflictingKeySources)
        ));
    }

    #[test]
    fn garbage_public_key_is_rejected() {
        let config = AuthConfig {
            enabled: true,
            jwt_public_key: "not a pem".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(
            Authenticator::new(config),
            Err(ConfigError::UnsupportedPublicKey)
        ));
    }

    #[test]
    fn missing_header_is_missing_bearer_token() {
        let auth = secret_auth();
        let err = auth.validate_bearer(None).expect_err("should fail");
        assert_eq!(err.message, "missing bearer token");
        assert_eq!(err.kind, "unauthorized");

        let err = auth.validate_bearer(Some("   ")).expect_err("should fail");
        assert_eq!(err.message, "missing bearer token");
    }

    #[test]
    fn malformed_header_is_invalid() {
        let auth = secret_auth();
        let err = auth
            .validate_bearer(Some("Basic dXNlcjpwYXNz"))
            .expect_err("should fail");
        assert_eq!(err.message, "invalid authorization header");

        let err = auth.validate_bearer(Some("Bearer")).expect_err("should fail");
        assert_eq!(err.message, "invalid authorization header");
    }

    #[test]
    fn valid_hs256_token_is_accepted() {
        let auth = secret_auth();
        let token = sign(&json!({"sub": "tester", "exp": FAR_FUTURE}), "sandbox-secret");
        assert!(auth.validate_bearer(Some(&format!("Bearer {token}"))).is_ok());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let auth = secret_auth();
        let token = sign(&json!({"exp": FAR_FUTURE}), "sandbox-secret");
        assert!(auth.validate_bearer(Some(&format!("bearer {token}"))).is_ok());
    }

    #[test]
    fn wrong_secret_is_invalid_token() {
        let auth = secret_auth();
        let token = sign(&json!({"exp": FAR_FUTURE}), "other-secret");
        let err = auth
            .validate_bearer(Some(&format!("Bearer {token}")))
            .expect_err("should fail");
        assert_eq!(err.message, "invalid token");
    }

    #[test]
    fn unsigned_token_is_invalid_token() {
        // {"alg":"none","typ":"JWT"}.{"sub":"x"}. with no signature
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ4In0.";
        let auth = secret_auth();
        let err = auth
            .validate_bearer(Some(&format!("Bearer {token}")))
            .expect_err("should fail");
        assert_eq!(err.message, "invalid token");
    }

    #[test]
    fn audience_constraint_is_enforced() {
        let auth = Authenticator::new(AuthConfig {
            enabled: true,
            jwt_secret: "sandbox-secret".to_string(),
            audience: "sandbox".to_string(),
            ..AuthConfig::default()
        })
        .expect("authenticator");

        let wrong = sign(&json!({"aud": "elsewhere", "exp": FAR_FUTURE}), "sandbox-secret");
        let err = auth
            .validate_bearer(Some(&format!("Bearer {wrong}")))
            .expect_err("should fail");
        assert_eq!(err.message, "invalid audience");

        let exact = sign(&json!({"aud": "sandbox", "exp": FAR_FUTURE}), "sandbox-secret");
        assert!(auth.validate_bearer(Some(&format!("Bearer {exact}"))).is_ok());

        let listed = sign(
            &json!({"aud": ["other", "sandbox"], "exp": FAR_FUTURE}),
            "sandbox-secret",
        );
        assert!(auth
            .validate_bearer(Some(&format!("Bearer {listed}")))
            .is_ok());
    }

    #[test]
    fn issuer_constraint_is_enforced() {
        let auth = Authenticator::new(AuthConfig {
            enabled: true,
            jwt_secret: "sandbox-secret".to_string(),
            issuer: "https://issuer.test".to_string(),
            ..AuthConfig::default()
        })
        .expect("authenticator");

        let wrong = sign(&json!({"iss": "someone-else", "exp": FAR_FUTURE}), "sandbox-secret");
        let err = auth
            .validate_bearer(Some(&format!("Bearer {wrong}")))
            .expect_err("should fail");
        assert_eq!(err.message, "invalid issuer");

        let right = sign(
            &json!({"iss": "https://issuer.test", "exp": FAR_FUTURE}),
            "sandbox-secret",
        );
        assert!(auth.validate_bearer(Some(&format!("Bearer {right}"))).is_ok());
    }
}
