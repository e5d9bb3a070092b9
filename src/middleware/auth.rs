// src/middleware/auth.rs

use std::{
    convert::Infallible,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::{auth::Role, scope::RequestScope},
};

/// Token `Bearer` do cabeçalho Authorization, se houver.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Caminho completo do pedido, mesmo dentro de rotas aninhadas.
pub fn request_path(request: &Request) -> String {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

// O middleware em si: resolve o escopo e o deixa nas "extensions".
pub async fn scope_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_token(request.headers()).and_then(|t| app_state.token_codec.verify(&t));
    let path = request_path(&request);

    let scope = app_state.scope_resolver.resolve(
        claims.as_ref(),
        request.headers(),
        request.method(),
        &path,
    )?;

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

// Extrator para obter o escopo diretamente nos handlers
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestScope>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

/// Escopo com local garantido. Quase todas as rotas de negócio usam este.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub local_id: Uuid,
    pub usuario_id: Option<Uuid>,
    pub rol: Option<Role>,
}

impl TenantScope {
    pub fn require(&self, capability: fn(&Role) -> bool, action: &str) -> Result<(), AppError> {
        if self.rol.as_ref().is_some_and(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("sem permissão para {action}")))
        }
    }
}

impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::from_request_parts(parts, state).await?;
        let local_id = scope.local_id.ok_or(AppError::TenantRequired)?;

        Ok(TenantScope {
            local_id,
            usuario_id: scope.usuario_id,
            rol: scope.rol,
        })
    }
}

/// IP do cliente para o controle de tentativas de login. Sem `ConnectInfo`
/// (testes em processo) usa o endereço não especificado.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(ClientIp(ip))
    }
}
