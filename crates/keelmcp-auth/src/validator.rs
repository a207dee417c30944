//! Bearer token validation.
//!
//! [`TokenValidator`] is the narrow interface the HTTP runtimes gate
//! requests with; [`JwtValidator`] implements it for RS256 JWTs backed
//! by a JWKS issuer. Validation order: format, header, claims, then
//! signature - the JWKS fetch only happens for tokens that already
//! passed every local check.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation};
use tracing::debug;

use keelmcp_protocol::AuthError;

use crate::jwks::JwksCache;
use crate::jwt::{Jwt, JwtClaims};

/// Default tolerance for clock drift between issuer and validator.
const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// The interface HTTP transports consult per request.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// True when the token grants access. `None` means no token was
    /// presented.
    async fn validate(&self, token: Option<&str>) -> bool;
}

/// What a [`JwtValidator`] checks beyond signature and expiry.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Expected `iss`, compared verbatim
    pub expected_issuer: Option<String>,
    /// Expected audience; must be contained in `aud`
    pub expected_audience: Option<String>,
    /// Expected `azp`; an absent claim fails when this is set
    pub expected_authorized_party: Option<String>,
    /// Allowed clock skew for `exp`/`nbf`
    pub allowed_clock_skew: Duration,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            expected_issuer: None,
            expected_audience: None,
            expected_authorized_party: None,
            allowed_clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// RS256 JWT validator with JWKS-backed keys.
#[derive(Debug, Clone)]
pub struct JwtValidator {
    /// Issuer whose JWKS signs the tokens
    issuer: String,
    options: ValidationOptions,
    jwks: JwksCache,
}

impl JwtValidator {
    /// Validator for `issuer` with the given options and a shared cache.
    pub fn new(issuer: impl Into<String>, options: ValidationOptions, jwks: JwksCache) -> Self {
        let issuer = issuer.into();
        Self { issuer, options, jwks }
    }

    /// Validator that requires `iss` to equal the JWKS issuer.
    pub fn for_issuer(issuer: impl Into<String>, jwks: JwksCache) -> Self {
        let issuer = issuer.into();
        Self {
            options: ValidationOptions {
                expected_issuer: Some(issuer.clone()),
                ..Default::default()
            },
            issuer,
            jwks,
        }
    }

    /// Full validation, returning the claims on success or the first
    /// failed check.
    pub async fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        // Format and header checks need no network.
        let jwt = Jwt::parse(token)?;

        if jwt.header.alg != "RS256" {
            return Err(AuthError::UnsupportedAlgorithm);
        }
        let kid = jwt.header.kid.as_deref().ok_or(AuthError::MissingKeyId)?;

        self.check_claims(&jwt.claims)?;

        // Key lookup and signature verification last.
        let key = self.jwks.decoding_key(&self.issuer, kid).await?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.options.allowed_clock_skew.as_secs();
        validation.validate_aud = false;
        // Claim checks already ran with tagged errors; decode is for
        // the signature alone.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<serde_json::Value>(token, &key, &validation)
            .map_err(|e| {
                debug!(error = %e, "signature verification failed");
                AuthError::SignatureFailed
            })?;

        Ok(jwt.claims)
    }

    /// The ordered claim checks: issuer, audience, authorized party,
    /// then time bounds with skew.
    fn check_claims(&self, claims: &JwtClaims) -> Result<(), AuthError> {
        if let Some(expected) = &self.options.expected_issuer
            && claims.iss.as_deref() != Some(expected.as_str())
        {
            return Err(AuthError::InvalidIssuer);
        }

        if let Some(expected) = &self.options.expected_audience {
            let contained = claims
                .aud
                .as_ref()
                .is_some_and(|aud| aud.contains(expected));
            if !contained {
                return Err(AuthError::InvalidAudience);
            }
        }

        if let Some(expected) = &self.options.expected_authorized_party
            && claims.azp.as_deref() != Some(expected.as_str())
        {
            return Err(AuthError::InvalidAuthorizedParty);
        }

        let now = chrono::Utc::now().timestamp();
        let skew = self.options.allowed_clock_skew.as_secs() as i64;

        // `exp` is required; a token that cannot expire is rejected.
        let exp = claims.exp.ok_or(AuthError::Expired)?;
        if exp + skew < now {
            return Err(AuthError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && nbf - skew > now
        {
            return Err(AuthError::NotYetValid);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: Option<&str>) -> bool {
        let Some(token) = token else { return false };
        match self.validate_token(token).await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "token rejected");
                false
            }
        }
    }
}

/// Validator that accepts a fixed set of opaque tokens. Intended for
/// tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: Vec<String>,
}

impl StaticTokenValidator {
    /// Accept exactly these tokens.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.tokens.iter().any(|known| known == t))
    }
}
