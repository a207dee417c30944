//! Compact-JWS parsing and claim checks.
//!
//! [`Jwt::parse`] splits and decodes a token without verifying it;
//! signature verification happens in the validator once the JWKS key
//! is at hand. Five-segment tokens are JWE and rejected outright.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use keelmcp_protocol::AuthError;

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    /// One audience string
    Single(String),
    /// Several audience strings
    Multiple(Vec<String>),
}

impl Audience {
    /// True when `value` is among the audiences.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(list) => list.iter().any(|s| s == value),
        }
    }

    /// All audience values.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Multiple(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

/// Decoded JOSE header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm
    pub alg: String,
    /// Token type, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Key id selecting the JWKS entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Decoded claims. Unknown claims are preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience(s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiry, seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not-before, seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issued-at, seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Space-separated scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Authorized party
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    /// Client id (RFC 9068 and friends)
    #[serde(rename = "client_id", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Anything else
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A parsed-but-unverified token.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// Decoded header
    pub header: JwtHeader,
    /// Decoded claims
    pub claims: JwtClaims,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// The token as received
    pub raw: String,
}

impl Jwt {
    /// Split and decode a compact token. No signature verification.
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        match segments.len() {
            3 => {}
            5 => return Err(AuthError::JweNotSupported),
            _ => return Err(AuthError::InvalidFormat),
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(segments[0])
            .map_err(|_| AuthError::InvalidBase64)?;
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(segments[1])
            .map_err(|_| AuthError::InvalidBase64)?;
        let signature = URL_SAFE_NO_PAD
            .decode(segments[2])
            .map_err(|_| AuthError::InvalidBase64)?;

        let header: JwtHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidJson)?;
        let claims: JwtClaims =
            serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidJson)?;

        Ok(Self {
            header,
            claims,
            signature,
            raw: token.to_string(),
        })
    }

    /// `base64url(header) + "." + base64url(payload)` - the bytes the
    /// signature covers.
    pub fn signing_input(&self) -> &str {
        match self.raw.rfind('.') {
            Some(pos) => &self.raw[..pos],
            None => &self.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn token(header: serde_json::Value, claims: serde_json::Value) -> String {
        format!(
            "{}.{}.{}",
            encode_segment(&header),
            encode_segment(&claims),
            URL_SAFE_NO_PAD.encode(b"sig")
        )
    }

    #[test]
    fn three_segment_tokens_parse() {
        let raw = token(
            json!({"alg": "RS256", "typ": "JWT", "kid": "k1"}),
            json!({"iss": "https://issuer.example", "aud": "mcp", "exp": 1}),
        );
        let jwt = Jwt::parse(&raw).unwrap();
        assert_eq!(jwt.header.alg, "RS256");
        assert_eq!(jwt.header.kid.as_deref(), Some("k1"));
        assert_eq!(jwt.claims.iss.as_deref(), Some("https://issuer.example"));
        assert!(jwt.claims.aud.as_ref().unwrap().contains("mcp"));
    }

    #[test]
    fn five_segments_are_jwe() {
        assert!(matches!(Jwt::parse("a.b.c.d.e"), Err(AuthError::JweNotSupported)));
    }

    #[test]
    fn wrong_segment_counts_are_malformed() {
        assert!(matches!(Jwt::parse("a.b"), Err(AuthError::InvalidFormat)));
        assert!(matches!(Jwt::parse("abc"), Err(AuthError::InvalidFormat)));
    }

    #[test]
    fn bad_base64_is_reported() {
        assert!(matches!(Jwt::parse("!!!.###.$$$"), Err(AuthError::InvalidBase64)));
    }

    #[test]
    fn bad_json_is_reported() {
        let raw = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode("not json"),
            URL_SAFE_NO_PAD.encode("{}"),
            URL_SAFE_NO_PAD.encode("s")
        );
        assert!(matches!(Jwt::parse(&raw), Err(AuthError::InvalidJson)));
    }

    #[test]
    fn audience_union_contains_and_values() {
        let single = Audience::Single("a".into());
        assert!(single.contains("a"));
        assert!(!single.contains("b"));
        assert_eq!(single.values(), vec!["a"]);

        let multiple = Audience::Multiple(vec!["a".into(), "b".into()]);
        assert!(multiple.contains("b"));
        assert_eq!(multiple.values(), vec!["a", "b"]);

        let decoded: Audience = serde_json::from_value(json!(["x", "y"])).unwrap();
        assert!(matches!(decoded, Audience::Multiple(_)));
    }

    #[test]
    fn signing_input_covers_header_and_payload() {
        let raw = token(json!({"alg": "RS256", "kid": "k"}), json!({"exp": 1}));
        let jwt = Jwt::parse(&raw).unwrap();
        let expected = raw.rsplit_once('.').unwrap().0;
        assert_eq!(jwt.signing_input(), expected);
    }
}
