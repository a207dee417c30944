//! # keelmcp-auth
//!
//! The OAuth/JWT layer for keelmcp's HTTP transports:
//!
//! - RFC 8414 / RFC 9728 discovery endpoints and an RFC 7591 dynamic
//!   client registration stub, mounted as an axum router.
//! - A [`TokenValidator`] trait the HTTP runtimes gate requests with,
//!   and its JWT implementation: compact-JWS parsing (JWE rejected),
//!   RS256-only, `kid`-addressed JWKS keys fetched per issuer with a
//!   shared singleflight cache, and ordered claim checks with clock
//!   skew.

pub mod jwks;
pub mod jwt;
pub mod metadata;
pub mod validator;

pub use jwks::JwksCache;
pub use jwt::{Audience, Jwt, JwtClaims, JwtHeader};
pub use metadata::{
    AuthorizationServerMetadata, OAuthConfig, ProtectedResourceMetadata, oauth_router,
};
pub use validator::{JwtValidator, StaticTokenValidator, TokenValidator, ValidationOptions};

pub use keelmcp_protocol::AuthError;
