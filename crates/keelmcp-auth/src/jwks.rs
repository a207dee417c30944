//! JWKS fetching and caching.
//!
//! One shared cache keyed by issuer, TTL-bounded, with at most one
//! concurrent refresh per issuer: concurrent validations against a cold
//! issuer line up behind the same fetch instead of stampeding the
//! authorization server.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use keelmcp_protocol::AuthError;

/// Default cache TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: SystemTime,
    ttl: Duration,
}

impl CachedJwks {
    fn is_fresh(&self) -> bool {
        SystemTime::now()
            .duration_since(self.fetched_at)
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct IssuerSlot {
    /// Serializes refreshes for this issuer (singleflight).
    refresh: Mutex<()>,
    cached: RwLock<Option<CachedJwks>>,
}

/// Shared, issuer-keyed JWKS cache.
///
/// Create once at startup and hand clones to every validator.
#[derive(Clone)]
pub struct JwksCache {
    slots: Arc<DashMap<String, Arc<IssuerSlot>>>,
    http: reqwest::Client,
    ttl: Duration,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("issuers", &self.slots.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

impl JwksCache {
    /// Cache with the default 10-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            ttl,
        }
    }

    /// The JWKS URL for an issuer.
    pub fn jwks_url(issuer: &str) -> String {
        format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
    }

    /// Find the decoding key for `kid` under `issuer`, fetching or
    /// refreshing the key set as needed.
    pub async fn decoding_key(&self, issuer: &str, kid: &str) -> Result<DecodingKey, AuthError> {
        let slot = self
            .slots
            .entry(issuer.to_string())
            .or_insert_with(|| Arc::new(IssuerSlot::default()))
            .clone();

        if let Some(cached) = slot.cached.read().await.as_ref()
            && cached.is_fresh()
            && let Some(jwk) = cached.jwks.find(kid)
        {
            return decoding_key_from_jwk(jwk);
        }

        // Cold or stale, or an unknown kid (key rotation): refresh, one
        // flight at a time per issuer.
        let _flight = slot.refresh.lock().await;
        if let Some(cached) = slot.cached.read().await.as_ref()
            && cached.is_fresh()
            && let Some(jwk) = cached.jwks.find(kid)
        {
            return decoding_key_from_jwk(jwk);
        }

        let url = Self::jwks_url(issuer);
        debug!(%url, "fetching JWKS");
        let jwks: JwkSet = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, %url, "JWKS fetch failed");
                AuthError::MetadataFetch
            })?
            .error_for_status()
            .map_err(|_| AuthError::MetadataFetch)?
            .json()
            .await
            .map_err(|_| AuthError::MetadataFetch)?;

        *slot.cached.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: SystemTime::now(),
            ttl: self.ttl,
        });

        match jwks.find(kid) {
            Some(jwk) => decoding_key_from_jwk(jwk),
            None => Err(AuthError::KeyNotFound),
        }
    }
}

/// Build an RSA decoding key from a JWK: `n`/`e` components when
/// present, else the leaf `x5c` certificate.
fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|_| AuthError::KeyNotFound)
        }
        _ => {
            if let Some(cert) = jwk.common.x509_chain.as_ref().and_then(|chain| chain.first()) {
                rsa_key_from_x5c(cert)
            } else {
                Err(AuthError::KeyNotFound)
            }
        }
    }
}

/// Extract the PKCS#1 RSAPublicKey from a base64 DER certificate.
///
/// Walks the DER for the rsaEncryption AlgorithmIdentifier and takes
/// the BIT STRING that follows it (the SubjectPublicKeyInfo payload).
fn rsa_key_from_x5c(cert_b64: &str) -> Result<DecodingKey, AuthError> {
    use base64::Engine as _;
    let der = base64::engine::general_purpose::STANDARD
        .decode(cert_b64)
        .map_err(|_| AuthError::InvalidBase64)?;

    // OID 1.2.840.113549.1.1.1 (rsaEncryption), tag+len included.
    const RSA_OID: &[u8] = &[0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
    let oid_pos = der
        .windows(RSA_OID.len())
        .position(|w| w == RSA_OID)
        .ok_or(AuthError::KeyNotFound)?;

    // AlgorithmIdentifier = OID + NULL, then the subjectPublicKey BIT STRING.
    let mut pos = oid_pos + RSA_OID.len();
    if der.get(pos) == Some(&0x05) {
        pos += 2; // NULL, zero length
    }
    if der.get(pos) != Some(&0x03) {
        return Err(AuthError::KeyNotFound);
    }
    pos += 1;
    let (len, len_bytes) = der_length(&der[pos..]).ok_or(AuthError::KeyNotFound)?;
    pos += len_bytes;
    // Skip the unused-bits octet of the BIT STRING.
    let start = pos + 1;
    let end = pos + len;
    if start >= end || end > der.len() {
        return Err(AuthError::KeyNotFound);
    }
    Ok(DecodingKey::from_rsa_der(&der[start..end]))
}

/// Parse a DER length field: (length, bytes consumed).
fn der_length(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        return Some((first as usize, 1));
    }
    let count = (first & 0x7f) as usize;
    if count == 0 || count > 4 || bytes.len() <= count {
        return None;
    }
    let mut len = 0usize;
    for b in &bytes[1..=count] {
        len = (len << 8) | *b as usize;
    }
    Some((len, 1 + count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2048-bit RSA modulus (base64url) borrowed from the RFC 7515
    // example key set shape; the validator tests exercise real
    // signatures, here we only care about fetch/cache plumbing.
    const TEST_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
    const TEST_E: &str = "AQAB";

    fn jwks_body() -> serde_json::Value {
        serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": "key-1",
                "use": "sig",
                "alg": "RS256",
                "n": TEST_N,
                "e": TEST_E
            }]
        })
    }

    #[test]
    fn jwks_url_normalizes_trailing_slash() {
        assert_eq!(
            JwksCache::jwks_url("https://issuer.example/"),
            "https://issuer.example/.well-known/jwks.json"
        );
        assert_eq!(
            JwksCache::jwks_url("https://issuer.example"),
            "https://issuer.example/.well-known/jwks.json"
        );
    }

    #[tokio::test]
    async fn fetches_and_caches_per_issuer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .expect(1) // the second lookup must hit the cache
            .mount(&server)
            .await;

        let cache = JwksCache::new();
        cache.decoding_key(&server.uri(), "key-1").await.unwrap();
        cache.decoding_key(&server.uri(), "key-1").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_kid_is_key_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .mount(&server)
            .await;

        let cache = JwksCache::new();
        let err = cache.decoding_key(&server.uri(), "other-key").await.unwrap_err();
        assert_eq!(err, AuthError::KeyNotFound);
    }

    #[tokio::test]
    async fn fetch_failure_is_metadata_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = JwksCache::new();
        let err = cache.decoding_key(&server.uri(), "key-1").await.unwrap_err();
        assert_eq!(err, AuthError::MetadataFetch);
    }

    #[test]
    fn der_length_short_and_long_forms() {
        assert_eq!(der_length(&[0x20]), Some((32, 1)));
        assert_eq!(der_length(&[0x81, 0x80, 0x00]), Some((128, 2)));
        assert_eq!(der_length(&[0x82, 0x01, 0x00, 0x00]), Some((256, 3)));
        assert_eq!(der_length(&[]), None);
    }
}
