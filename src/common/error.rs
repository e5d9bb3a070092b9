// src/common/error.rs

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

// Um único tipo de erro para a API inteira. Cada variante sabe o seu status
// HTTP e o código curto que o frontend usa para decidir o que mostrar.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Corpo da requisição inválido: {0}")]
    InvalidBody(String),

    #[error("Parâmetro de rota inválido: {0}")]
    InvalidPathParam(String),

    // --- Autenticação / escopo ---
    #[error("Autenticação necessária")]
    Unauthenticated,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Rol sem acesso a esta rota")]
    RoleRestricted,

    #[error("Local obrigatório")]
    TenantRequired,

    #[error("Identificador de local inválido")]
    InvalidTenantId,

    #[error("Identificador de usuário inválido")]
    InvalidUserId,

    #[error("Token com conteúdo inválido")]
    InvalidCredentialPayload,

    #[error("Muitas tentativas de login")]
    RateLimited { retry_after_secs: u64 },

    // --- Inventário ---
    #[error("Quantidade inválida")]
    InvalidQuantity,

    #[error("Tipo de movimento inválido: {0}")]
    InvalidMovementType(String),

    #[error("{0} não encontrado")]
    NotFound(&'static str),

    #[error("Nenhum lote disponível")]
    NoLotAvailable,

    #[error("Quantidade insuficiente no lote (disponível: {available})")]
    InsufficientLotQuantity { available: Decimal },

    #[error("O insumo possui lotes registrados")]
    InsumoHasLots,

    #[error("Registro duplicado: {0}")]
    Conflict(String),

    // --- Infraestrutura ---
    #[error("Configuração fatal: {0}")]
    Fatal(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Código curto, estável, para o cliente.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidBody(_) => "validacion",
            AppError::InvalidPathParam(_) => "parametro_invalido",
            AppError::Unauthenticated => "no_autenticado",
            AppError::InvalidCredentials => "credenciales_invalidas",
            AppError::Forbidden(_) => "prohibido",
            AppError::RoleRestricted => "rol_restringido",
            AppError::TenantRequired => "local_requerido",
            AppError::InvalidTenantId => "local_invalido",
            AppError::InvalidUserId => "usuario_invalido",
            AppError::InvalidCredentialPayload => "token_invalido",
            AppError::RateLimited { .. } => "demasiados_intentos",
            AppError::InvalidQuantity => "cantidad_invalida",
            AppError::InvalidMovementType(_) => "tipo_invalido",
            AppError::NotFound(_) => "no_encontrado",
            AppError::NoLotAvailable => "sin_lote_disponible",
            AppError::InsufficientLotQuantity { .. } => "cantidad_insuficiente_lote",
            AppError::InsumoHasLots => "insumo_con_lotes",
            AppError::Conflict(_) => "duplicado",
            AppError::Fatal(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => "error_interno",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidBody(_)
            | AppError::InvalidPathParam(_)
            | AppError::TenantRequired
            | AppError::InvalidTenantId
            | AppError::InvalidUserId
            | AppError::InvalidCredentialPayload
            | AppError::InvalidQuantity
            | AppError::InvalidMovementType(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::RoleRestricted => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoLotAvailable
            | AppError::InsufficientLotQuantity { .. }
            | AppError::InsumoHasLots
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Fatal(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Rejeições dos extratores do axum (ver common::extract).
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidPathParam(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                json!({
                    "error": code,
                    "message": "Um ou mais campos são inválidos.",
                    "details": details,
                })
            }
            // 5xx: loga o detalhe, responde genérico.
            e if status.is_server_error() => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                json!({ "error": code, "message": "Ocorreu um erro inesperado." })
            }
            e => json!({ "error": code, "message": e.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
