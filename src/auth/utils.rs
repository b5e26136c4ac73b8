use crate::{
    auth::Claims,
    errors::{AppError, AppResult},
    services::role_registry::RoleRegistry,
};

pub async fn require_permission(
    registry: &RoleRegistry,
    claims: &Claims,
    capability: &str,
) -> AppResult<()> {
    if registry.role_can(&claims.role, capability).await {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Role '{}' lacks the '{}' permission",
        claims.role, capability
    )))
}

pub async fn require_any_permission(
    registry: &RoleRegistry,
    claims: &Claims,
    capabilities: &[&str],
) -> AppResult<()> {
    for capability in capabilities {
        if registry.role_can(&claims.role, capability).await {
            return Ok(());
        }
    }
    Err(AppError::Forbidden(format!(
        "Role '{}' lacks any of the permissions: {}",
        claims.role,
        capabilities.join(", ")
    )))
}

/// Owners always pass; anyone else needs `capability`.
pub async fn require_owner_or_permission(
    registry: &RoleRegistry,
    claims: &Claims,
    resource_owner: &str,
    capability: &str,
) -> AppResult<()> {
    if claims.sub == resource_owner {
        return Ok(());
    }
    require_permission(registry, claims, capability).await
}
