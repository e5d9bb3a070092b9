// src/handlers/inventory.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::{
        error::AppError,
        extract::{AppJson, AppPath},
    },
    config::AppState,
    middleware::auth::TenantScope,
    models::{
        auth::Role,
        inventory::{quantity_from_f64, InsumoChanges, MovementOptions, MovementType, NewInsumo},
    },
};

// ---
// Validação Customizada
// ---
fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payloads
// ---
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInsumoPayload {
    #[validate(length(min = 1, max = 120, message = "O nome é obrigatório."))]
    pub nombre: String,

    #[validate(length(min = 1, max = 20, message = "A unidade é obrigatória."))]
    pub unidad: String,

    #[validate(custom(function = "validate_not_negative"))]
    #[serde(default)]
    pub stock_minimo: Decimal,

    #[validate(range(min = 0, max = 3650, message = "Dias de alerta fora do intervalo."))]
    #[serde(default)]
    pub alerta_vencimiento_dias: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInsumoPayload {
    #[validate(length(min = 1, max = 120, message = "O nome não pode ser vazio."))]
    pub nombre: Option<String>,

    #[validate(length(min = 1, max = 20, message = "A unidade não pode ser vazia."))]
    pub unidad: Option<String>,

    #[validate(custom(function = "validate_not_negative"))]
    pub stock_minimo: Option<Decimal>,

    #[validate(range(min = 0, max = 3650, message = "Dias de alerta fora do intervalo."))]
    pub alerta_vencimiento_dias: Option<i32>,
}

// `tipo` e `cantidad` chegam crus: o formato é conferido antes de qualquer escrita.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostMovementPayload {
    pub tipo: String,
    pub cantidad: f64,
    pub lote_id: Option<Uuid>,

    #[validate(length(max = 60, message = "Rótulo do lote muito longo."))]
    pub lote: Option<String>,

    pub fecha_vencimiento: Option<NaiveDate>,

    #[validate(length(max = 255, message = "Motivo muito longo."))]
    pub motivo: Option<String>,
}

// ---
// Handlers: Insumos
// ---

pub async fn list_insumos(
    State(app_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_view_inventory, "ver o inventário")?;

    let insumos = app_state.inventory_service.list_insumos(scope.local_id).await?;
    Ok((StatusCode::OK, Json(insumos)))
}

pub async fn create_insumo(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppJson(payload): AppJson<CreateInsumoPayload>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_manage_inventory, "cadastrar insumos")?;
    payload.validate().map_err(AppError::ValidationError)?;

    let insumo = app_state
        .inventory_service
        .create_insumo(NewInsumo {
            local_id: scope.local_id,
            nombre: payload.nombre.trim().to_string(),
            unidad: payload.unidad.trim().to_string(),
            stock_minimo: payload.stock_minimo,
            alerta_vencimiento_dias: payload.alerta_vencimiento_dias,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(insumo)))
}

pub async fn get_insumo(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_view_inventory, "ver o inventário")?;

    let insumo = app_state
        .inventory_service
        .get_insumo(scope.local_id, insumo_id)
        .await?;
    Ok((StatusCode::OK, Json(insumo)))
}

pub async fn update_insumo(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateInsumoPayload>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_manage_inventory, "editar insumos")?;
    payload.validate().map_err(AppError::ValidationError)?;

    let changes = InsumoChanges {
        nombre: payload.nombre.map(|n| n.trim().to_string()),
        unidad: payload.unidad.map(|u| u.trim().to_string()),
        stock_minimo: payload.stock_minimo,
        alerta_vencimiento_dias: payload.alerta_vencimiento_dias,
    };

    let insumo = app_state
        .inventory_service
        .update_insumo(scope.local_id, insumo_id, changes)
        .await?;
    Ok((StatusCode::OK, Json(insumo)))
}

pub async fn delete_insumo(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_manage_inventory, "excluir insumos")?;

    app_state
        .inventory_service
        .delete_insumo(scope.local_id, insumo_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---
// Handlers: Livro-razão
// ---

pub async fn post_movement(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
    AppJson(payload): AppJson<PostMovementPayload>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_post_movements, "registrar movimentos")?;
    payload.validate().map_err(AppError::ValidationError)?;

    let tipo: MovementType = payload.tipo.parse()?;
    let cantidad = quantity_from_f64(payload.cantidad)?;

    let receipt = app_state
        .inventory_service
        .post_movement(
            scope.local_id,
            insumo_id,
            tipo,
            cantidad,
            MovementOptions {
                lote_id: payload.lote_id,
                lote: payload.lote,
                fecha_vencimiento: payload.fecha_vencimiento,
                motivo: payload.motivo,
                usuario_id: scope.usuario_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_lots(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_view_inventory, "ver o inventário")?;

    let lots = app_state
        .inventory_service
        .list_lots(scope.local_id, insumo_id)
        .await?;
    Ok((StatusCode::OK, Json(lots)))
}

pub async fn list_movements(
    State(app_state): State<AppState>,
    scope: TenantScope,
    AppPath(insumo_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_view_inventory, "ver o inventário")?;

    let movements = app_state
        .inventory_service
        .list_movements(scope.local_id, insumo_id)
        .await?;
    Ok((StatusCode::OK, Json(movements)))
}

pub async fn stock_alerts(
    State(app_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, AppError> {
    scope.require(Role::can_view_inventory, "ver o inventário")?;

    let alerts = app_state.inventory_service.stock_alerts(scope.local_id).await?;
    Ok((StatusCode::OK, Json(alerts)))
}
