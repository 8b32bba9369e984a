//! Bearer-token authentication and principal resolution.
//!
//! Every request carries a JWT issued by the identity provider. The token
//! is verified against the provider's JWKS (fetched once and cached), the
//! realm roles are collapsed to the single most-privileged domain role,
//! and the result is a `Principal` whose `DataScope` drives every
//! scope-aware query in the service layer.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use shared::models::enums::UserRole;

use crate::errors::{ApiError, ApiResult};
use crate::AppState;

/// Query-predicate inputs derived from the principal's role.
#[derive(Debug, Clone, Default)]
pub struct DataScope {
    pub own_data_only: bool,
    pub user_id: Option<String>,
    pub assigned_to: Option<String>,
    pub full_pipeline: bool,
    pub pii_mask: bool,
    pub document_metadata_only: bool,
}

impl DataScope {
    /// Role-to-scope table. Prospects get the default (empty) scope, which
    /// matches no application rows at all.
    pub fn for_role(role: UserRole, subject: &str) -> Self {
        match role {
            UserRole::Borrower => DataScope {
                own_data_only: true,
                user_id: Some(subject.to_string()),
                ..Default::default()
            },
            UserRole::LoanOfficer => DataScope {
                assigned_to: Some(subject.to_string()),
                ..Default::default()
            },
            UserRole::Underwriter | UserRole::Admin => DataScope {
                full_pipeline: true,
                ..Default::default()
            },
            UserRole::Ceo => DataScope {
                full_pipeline: true,
                pii_mask: true,
                document_metadata_only: true,
                ..Default::default()
            },
            UserRole::Prospect => DataScope::default(),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: UserRole,
    pub email: String,
    pub name: String,
    pub data_scope: DataScope,
}

impl Principal {
    pub fn require_role(&self, allowed: &[UserRole]) -> ApiResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Role(format!(
                "role '{}' is not permitted for this operation",
                self.role
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

/// Picks the most privileged recognized role out of a token's realm roles.
pub fn resolve_role(realm_roles: &[String]) -> Option<UserRole> {
    realm_roles
        .iter()
        .filter_map(|r| UserRole::parse(r))
        .min_by_key(|r| r.privilege_rank())
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// JWKS fetched from the identity provider on first use and cached for the
/// process lifetime. An unknown `kid` triggers one refetch (key rotation).
pub struct JwksCache {
    url: String,
    http: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl JwksCache {
    pub fn new(url: String) -> Self {
        JwksCache {
            url,
            http: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    async fn refresh(&self) -> ApiResult<()> {
        debug!("Fetching JWKS from {}", self.url);
        let jwks: Jwks = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("JWKS fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("JWKS parse failed: {}", e)))?;

        let mut keys = self.keys.write().await;
        keys.clear();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(err) => warn!("Skipping malformed JWK '{}': {}", jwk.kid, err),
            }
        }
        Ok(())
    }

    pub async fn key_for(&self, kid: &str) -> ApiResult<DecodingKey> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }
        self.refresh().await?;
        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| ApiError::Auth(format!("unknown signing key '{}'", kid)))
    }
}

/// Verifies a bearer token and resolves the `Principal`.
pub async fn verify_token(state: &AppState, token: &str) -> ApiResult<Principal> {
    let header =
        decode_header(token).map_err(|e| ApiError::Auth(format!("malformed token: {}", e)))?;
    let kid = header
        .kid
        .ok_or_else(|| ApiError::Auth("token missing key id".to_string()))?;
    let key = state.jwks.key_for(&kid).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    if let Some(issuer) = &state.settings.auth.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &state.settings.auth.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|e| ApiError::Auth(format!("invalid token: {}", e)))?;
    let claims = data.claims;

    let realm_roles = claims.realm_access.map(|ra| ra.roles).unwrap_or_default();
    let role = resolve_role(&realm_roles)
        .ok_or_else(|| ApiError::Auth("token carries no recognized role".to_string()))?;

    let data_scope = DataScope::for_role(role, &claims.sub);
    Ok(Principal {
        user_id: claims.sub,
        role,
        email: claims.email.unwrap_or_default(),
        name: claims.name.unwrap_or_default(),
        data_scope,
    })
}

fn bearer_from_request(req: &HttpRequest) -> ApiResult<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Auth("missing Authorization header".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
        .ok_or_else(|| ApiError::Auth("Authorization header is not a bearer token".to_string()))
}

impl FromRequest for Principal {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Principal, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| ApiError::Internal("application state missing".to_string()))?
                .clone();
            let token = bearer_from_request(&req)?;
            verify_token(&state, &token).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_privileged_role_wins() {
        let roles = vec![
            "borrower".to_string(),
            "underwriter".to_string(),
            "offline_access".to_string(),
        ];
        assert_eq!(resolve_role(&roles), Some(UserRole::Underwriter));
    }

    #[test]
    fn admin_beats_ceo() {
        let roles = vec!["ceo".to_string(), "admin".to_string()];
        assert_eq!(resolve_role(&roles), Some(UserRole::Admin));
    }

    #[test]
    fn unrecognized_roles_resolve_to_none() {
        let roles = vec!["offline_access".to_string(), "uma_authorization".to_string()];
        assert_eq!(resolve_role(&roles), None);
    }

    #[test]
    fn borrower_scope_is_own_data_only() {
        let scope = DataScope::for_role(UserRole::Borrower, "user-1");
        assert!(scope.own_data_only);
        assert_eq!(scope.user_id.as_deref(), Some("user-1"));
        assert!(!scope.full_pipeline);
    }

    #[test]
    fn ceo_scope_masks_pii_and_restricts_documents() {
        let scope = DataScope::for_role(UserRole::Ceo, "ceo-1");
        assert!(scope.full_pipeline);
        assert!(scope.pii_mask);
        assert!(scope.document_metadata_only);
    }

    #[test]
    fn prospect_scope_matches_nothing() {
        let scope = DataScope::for_role(UserRole::Prospect, "p-1");
        assert!(!scope.own_data_only && !scope.full_pipeline && scope.assigned_to.is_none());
    }
}
