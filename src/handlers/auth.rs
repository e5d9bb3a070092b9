// src/handlers/auth.rs

use axum::{extract::State, Json};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    common::{error::AppError, extract::AppJson},
    config::AppState,
    middleware::auth::ClientIp,
    models::{
        auth::{AuthResponse, LoginUserPayload},
        scope::RequestScope,
    },
};

// Handler de login
pub async fn login(
    State(app_state): State<AppState>,
    ClientIp(ip): ClientIp,
    AppJson(payload): AppJson<LoginUserPayload>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let response = app_state
        .auth_service
        .login(ip, &payload.email, &payload.password)
        .await?;

    Ok(Json(response))
}

// Handler da rota protegida /me: devolve o escopo resolvido.
// O rol vai como texto: vazio sem rol, "public" no catálogo aberto.
pub async fn get_me(scope: RequestScope) -> Json<Value> {
    Json(json!({
        "localId": scope.local_id,
        "usuarioId": scope.usuario_id,
        "rol": scope.role_name(),
        "origen": scope.origen,
    }))
}
