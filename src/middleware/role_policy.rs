// src/middleware/role_policy.rs

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::{bearer_token, request_path},
    models::auth::Role,
    services::scope::header_role,
};

// Prefixos liberados para o mesero. "/" só vale exato.
const MESERO_PREFIXES: &[&str] = &["/api/restaurante", "/api/auth/login", "/health"];

/// O mesero só acessa operações de restaurante, login, health e a raiz.
/// Os demais papéis passam direto.
pub fn role_allows_path(role: Option<Role>, path: &str) -> bool {
    match role {
        Some(Role::Mesero) => {
            path == "/"
                || MESERO_PREFIXES.iter().any(|prefix| {
                    path == *prefix
                        || path
                            .strip_prefix(*prefix)
                            .is_some_and(|rest| rest.starts_with('/'))
                })
        }
        _ => true,
    }
}

// Lê o rol de novo (token ou cabeçalho legado); não altera o escopo,
// só deixa passar ou rejeita.
pub async fn role_guard(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let role = match bearer_token(request.headers()).and_then(|t| app_state.token_codec.verify(&t)) {
        Some(claims) => Some(claims.rol),
        None if app_state.scope_resolver.legacy_headers_enabled() => header_role(request.headers()),
        None => None,
    };

    let path = request_path(&request);
    if !role_allows_path(role, &path) {
        tracing::debug!(rol = ?role, %path, "rota bloqueada para o rol");
        return Err(AppError::RoleRestricted);
    }

    Ok(next.run(request).await)
}
