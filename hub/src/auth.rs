use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::HubError;

#[derive(Debug, Serialize, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

#[async_trait::async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates a bearer token and returns the client's subject, used as
    /// the `ClientId` for the rest of the session. Fails `Unauthorized`.
    async fn validate(&self, token: &str) -> Result<String, HubError>;

    /// Whether the validator has finished its own startup (fetched a JWKS,
    /// etc.) — surfaced on `/health/ready`.
    fn is_ready(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Auth0-style validator: RS256 tokens checked against a JWKS fetched from
/// `https://{AUTH0_DOMAIN}/.well-known/jwks.json`, following the teacher's
/// `JwtUtils` shape (one struct holding the decode configuration) but using
/// asymmetric keys fetched over the network instead of a shared secret.
pub struct Auth0Validator {
    domain: String,
    audience: String,
    jwks_url: String,
    client: reqwest::Client,
    cache: RwLock<Option<JwkSet>>,
}

impl Auth0Validator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            domain: config.auth0_domain.clone(),
            audience: config.auth0_audience.clone(),
            jwks_url: format!("https://{}/.well-known/jwks.json", config.auth0_domain),
            client: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, HubError> {
        let resp = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| HubError::Unavailable(format!("jwks fetch failed: {err}")))?;
        resp.json::<JwkSet>()
            .await
            .map_err(|err| HubError::Unavailable(format!("jwks decode failed: {err}")))
    }

    async fn decoding_key_for(&self, kid: &str) -> Result<DecodingKey, HubError> {
        {
            let cache = self.cache.read().await;
            if let Some(jwks) = cache.as_ref() {
                if let Some(jwk) = jwks.keys.iter().find(|k| k.kid == kid) {
                    return DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                        .map_err(|err| HubError::Internal(format!("bad jwk: {err}")));
                }
            }
        }

        // Cache miss: refresh once, the key may be new (rotation).
        let jwks = self.fetch_jwks().await?;
        let key = jwks
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .map(|jwk| DecodingKey::from_rsa_components(&jwk.n, &jwk.e))
            .ok_or_else(|| HubError::Unauthorized("unknown signing key".to_string()))?
            .map_err(|err| HubError::Internal(format!("bad jwk: {err}")))?;

        *self.cache.write().await = Some(jwks);
        Ok(key)
    }
}

#[async_trait::async_trait]
impl TokenValidator for Auth0Validator {
    async fn validate(&self, token: &str) -> Result<String, HubError> {
        let header = decode_header(token)
            .map_err(|err| HubError::Unauthorized(format!("malformed token: {err}")))?;
        let kid = header
            .kid
            .ok_or_else(|| HubError::Unauthorized("token missing kid".to_string()))?;

        let key = self.decoding_key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[format!("https://{}/", self.domain)]);

        let data = decode::<AccessTokenClaims>(token, &key, &validation)
            .map_err(|err| HubError::Unauthorized(format!("invalid token: {err}")))?;

        Ok(data.claims.sub)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Dev-only bypass (`SKIP_AUTH=true`): accepts any token, still pulling the
/// subject out of the payload when the token parses as a JWT, so local
/// testing against a real frontend keeps stable client IDs.
pub struct DevBypassValidator;

#[async_trait::async_trait]
impl TokenValidator for DevBypassValidator {
    async fn validate(&self, token: &str) -> Result<String, HubError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.validate_exp = false;

        match decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(err) => {
                warn!(error = %err, "SKIP_AUTH: token did not parse as a JWT, issuing a synthetic subject");
                Ok(format!("dev-{token}"))
            }
        }
    }

    fn is_ready(&self) -> bool {
        true
    }
}
