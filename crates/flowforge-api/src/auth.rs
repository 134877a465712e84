//! Authentication and tenancy (C15, spec section 4.14).
//!
//! Two credential schemes are accepted: a static `X-API-Key` header mapped through
//! `AUTH_API_KEYS_JSON`, or an `Authorization: Bearer` HS256 JWT validated against
//! `AUTH_JWT_KEYS_JSON`'s `kid`-keyed secret set. With `AUTH_ENABLED=false` every request is
//! treated as `local-dev`/`default`/`admin`, matching local development against the mock
//! executor and in-memory repository.

use axum::http::HeaderMap;
use flowforge_core::config::Settings;
use flowforge_core::error::{ForgeError, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request's resolved principal, tenant, and role.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub principal: String,
    pub tenant_id: String,
    pub role: Role,
}

impl AuthContext {
    /// Namespaces an agent name under this context's tenant, per the spec's
    /// `"{tenant_id}::{agent_name}"` convention.
    pub fn scoped_agent_name(&self, agent_name: &str) -> String {
        format!("{}::{agent_name}", self.tenant_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    VersionsRead,
    OptimizeRun,
    ParityRun,
    VersionsDeploy,
    VersionsRollback,
}

fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Viewer => &[Permission::VersionsRead],
        Role::Operator => &[Permission::VersionsRead, Permission::OptimizeRun, Permission::ParityRun],
        Role::Admin => &[
            Permission::VersionsRead,
            Permission::OptimizeRun,
            Permission::ParityRun,
            Permission::VersionsDeploy,
            Permission::VersionsRollback,
        ],
    }
}

impl AuthContext {
    pub fn has_permission(&self, permission: Permission) -> bool {
        role_permissions(self.role).contains(&permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ForgeError::Forbidden(format!("role {:?} lacks required permission {permission:?}", self.role)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeyEntry {
    tenant_id: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    exp: Option<usize>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
}

fn parse_api_keys(raw: &str) -> Result<HashMap<String, ApiKeyEntry>> {
    serde_json::from_str(raw)
        .map_err(|e| ForgeError::Configuration(format!("invalid AUTH_API_KEYS_JSON: {e}")))
}

fn parse_jwt_keys(raw: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(raw)
        .map_err(|e| ForgeError::Configuration(format!("invalid AUTH_JWT_KEYS_JSON: {e}")))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-api-key").and_then(|value| value.to_str().ok())
}

/// Resolves an [`AuthContext`] from request headers, per spec section 4.14's credential
/// precedence: API key first, then JWT, then (if auth is disabled) the local-dev default.
pub fn authenticate(settings: &Settings, headers: &HeaderMap) -> Result<AuthContext> {
    if !settings.auth_enabled {
        return Ok(AuthContext {
            principal: "local-dev".to_string(),
            tenant_id: settings.auth_default_tenant_id.clone(),
            role: Role::Admin,
        });
    }

    if let Some(api_key) = extract_api_key(headers) {
        let keys = parse_api_keys(&settings.auth_api_keys_json)?;
        let entry = keys
            .get(api_key)
            .ok_or_else(|| ForgeError::Unauthorized("unknown api key".to_string()))?;
        return Ok(AuthContext { principal: format!("apikey:{api_key}"), tenant_id: entry.tenant_id.clone(), role: entry.role });
    }

    if let Some(token) = extract_bearer(headers) {
        return authenticate_jwt(settings, token);
    }

    Err(ForgeError::Unauthorized("missing X-API-Key or Authorization header".to_string()))
}

fn authenticate_jwt(settings: &Settings, token: &str) -> Result<AuthContext> {
    let keys = parse_jwt_keys(&settings.auth_jwt_keys_json)?;
    if keys.is_empty() {
        return Err(ForgeError::Unauthorized("no JWT signing keys configured".to_string()));
    }

    let header = decode_header(token).map_err(|e| ForgeError::Unauthorized(format!("malformed jwt: {e}")))?;
    let secret = match &header.kid {
        Some(kid) => keys.get(kid).ok_or_else(|| ForgeError::Unauthorized(format!("unknown jwt kid '{kid}'")))?,
        None if keys.len() == 1 => keys.values().next().expect("checked non-empty"),
        None => {
            return Err(ForgeError::Unauthorized(
                "jwt carries no kid and multiple signing keys are configured".to_string(),
            ))
        }
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = settings.auth_jwt_clock_skew.as_secs();
    if let Some(issuer) = &settings.auth_jwt_issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(audience) = &settings.auth_jwt_audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let decoded = decode::<JwtClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| ForgeError::Unauthorized(format!("invalid jwt: {e}")))?;
    let claims = decoded.claims;

    Ok(AuthContext {
        principal: claims.sub,
        tenant_id: claims.tenant_id.unwrap_or_else(|| settings.auth_default_tenant_id.clone()),
        role: claims.role.unwrap_or(Role::Viewer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                axum::http::HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn auth_disabled_yields_local_dev_admin() {
        let settings = Settings::default();
        let ctx = authenticate(&settings, &HeaderMap::new()).unwrap();
        assert_eq!(ctx.principal, "local-dev");
        assert_eq!(ctx.role, Role::Admin);
    }

    #[test]
    fn missing_credentials_is_unauthorized_when_auth_enabled() {
        let mut settings = Settings::default();
        settings.auth_enabled = true;
        let err = authenticate(&settings, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, ForgeError::Unauthorized(_)));
    }

    #[test]
    fn api_key_resolves_configured_tenant_and_role() {
        let mut settings = Settings::default();
        settings.auth_enabled = true;
        settings.auth_api_keys_json = r#"{"key-1": {"tenant_id": "acme", "role": "operator"}}"#.to_string();
        let headers = headers_with(&[("x-api-key", "key-1")]);
        let ctx = authenticate(&settings, &headers).unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.role, Role::Operator);
    }

    #[test]
    fn unknown_api_key_is_unauthorized() {
        let mut settings = Settings::default();
        settings.auth_enabled = true;
        settings.auth_api_keys_json = r#"{"key-1": {"tenant_id": "acme", "role": "operator"}}"#.to_string();
        let headers = headers_with(&[("x-api-key", "nope")]);
        assert!(authenticate(&settings, &headers).is_err());
    }

    #[test]
    fn viewer_lacks_optimize_run_permission() {
        let ctx = AuthContext { principal: "p".to_string(), tenant_id: "t".to_string(), role: Role::Viewer };
        assert!(ctx.require_permission(Permission::VersionsRead).is_ok());
        assert!(ctx.require_permission(Permission::OptimizeRun).is_err());
    }

    #[test]
    fn scoped_agent_name_namespaces_by_tenant() {
        let ctx = AuthContext { principal: "p".to_string(), tenant_id: "acme".to_string(), role: Role::Admin };
        assert_eq!(ctx.scoped_agent_name("demo"), "acme::demo");
    }
}
