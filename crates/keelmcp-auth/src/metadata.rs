//! OAuth discovery endpoints and dynamic client registration.
//!
//! Serves `/.well-known/oauth-authorization-server` (RFC 8414),
//! `/.well-known/oauth-protected-resource` (RFC 9728) and, when
//! enabled, an RFC 7591 `/register` stub that mints credentials into an
//! in-memory store.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// RFC 8414 authorization server metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// JWKS document
    pub jwks_uri: String,
    /// Dynamic registration endpoint, when offered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Scopes this server understands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// Supported response types
    pub response_types_supported: Vec<String>,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource identifier
    pub resource: String,
    /// Authorization servers that protect it
    pub authorization_servers: Vec<String>,
}

/// RFC 7591 registration request. Only the fields the stub reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Requested grant types
    #[serde(default)]
    pub grant_types: Vec<String>,
    /// Requested token endpoint auth method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
}

/// RFC 7591 registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Issued client id
    pub client_id: String,
    /// Issued client secret
    pub client_secret: String,
    /// Issue time, seconds since the epoch
    pub client_id_issued_at: i64,
    /// 0: the secret does not expire
    pub client_secret_expires_at: i64,
    /// Echoed redirect URIs
    pub redirect_uris: Vec<String>,
    /// Echoed display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

/// Configuration for the discovery router.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Issuer identifier (base URL of the authorization server)
    pub issuer: String,
    /// The protected resource (this MCP server's URL)
    pub resource: String,
    /// Advertised scopes
    pub scopes: Vec<String>,
    /// Whether `/register` is mounted
    pub enable_registration: bool,
}

impl OAuthConfig {
    /// Config with the conventional endpoint layout under `issuer`.
    pub fn new(issuer: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            resource: resource.into(),
            scopes: vec!["mcp".to_string()],
            enable_registration: false,
        }
    }

    /// Mount the RFC 7591 registration stub.
    pub fn with_registration(mut self) -> Self {
        self.enable_registration = true;
        self
    }

    fn authorization_server_metadata(&self) -> AuthorizationServerMetadata {
        let base = self.issuer.trim_end_matches('/');
        AuthorizationServerMetadata {
            issuer: self.issuer.clone(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            jwks_uri: format!("{base}/.well-known/jwks.json"),
            registration_endpoint: self
                .enable_registration
                .then(|| format!("{base}/register")),
            scopes_supported: Some(self.scopes.clone()),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
        }
    }

    fn protected_resource_metadata(&self) -> ProtectedResourceMetadata {
        ProtectedResourceMetadata {
            resource: self.resource.clone(),
            authorization_servers: vec![self.issuer.clone()],
        }
    }
}

struct OAuthState {
    config: OAuthConfig,
    registered_clients: DashMap<String, ClientRegistrationResponse>,
}

/// Build the discovery router for mounting next to an MCP endpoint.
pub fn oauth_router(config: OAuthConfig) -> Router {
    let enable_registration = config.enable_registration;
    let state = Arc::new(OAuthState {
        config,
        registered_clients: DashMap::new(),
    });

    let mut router = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        );
    if enable_registration {
        router = router.route("/register", post(register_client));
    }
    router.with_state(state)
}

async fn authorization_server_metadata(
    State(state): State<Arc<OAuthState>>,
) -> Json<AuthorizationServerMetadata> {
    Json(state.config.authorization_server_metadata())
}

async fn protected_resource_metadata(
    State(state): State<Arc<OAuthState>>,
) -> Json<ProtectedResourceMetadata> {
    Json(state.config.protected_resource_metadata())
}

async fn register_client(
    State(state): State<Arc<OAuthState>>,
    Json(request): Json<ClientRegistrationRequest>,
) -> (StatusCode, Json<ClientRegistrationResponse>) {
    let response = ClientRegistrationResponse {
        client_id: Uuid::new_v4().to_string(),
        client_secret: Uuid::new_v4().to_string(),
        client_id_issued_at: chrono::Utc::now().timestamp(),
        client_secret_expires_at: 0,
        redirect_uris: request.redirect_uris,
        client_name: request.client_name,
    };
    info!(client_id = %response.client_id, "registered dynamic client");
    state
        .registered_clients
        .insert(response.client_id.clone(), response.clone());
    (StatusCode::CREATED, Json(response))
}
