// src/models/inventory.rs

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::error::AppError;

// --- 1. Insumo ---
// `stock_total` é um cache: soma das quantidades dos lotes ativos.
// Só o livro-razão (post_movement) mexe nele.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Insumo {
    pub id: Uuid,
    pub local_id: Uuid,
    pub nombre: String,
    pub unidad: String,
    pub stock_total: Decimal,
    pub stock_minimo: Decimal,
    pub alerta_vencimiento_dias: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInsumo {
    pub local_id: Uuid,
    pub nombre: String,
    pub unidad: String,
    pub stock_minimo: Decimal,
    pub alerta_vencimiento_dias: i32,
}

#[derive(Debug, Clone, Default)]
pub struct InsumoChanges {
    pub nombre: Option<String>,
    pub unidad: Option<String>,
    pub stock_minimo: Option<Decimal>,
    pub alerta_vencimiento_dias: Option<i32>,
}

// --- 2. Lote ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InsumoLote {
    pub id: Uuid,
    pub insumo_id: Uuid,
    pub local_id: Uuid,
    /// Rótulo livre do lote (ex.: número do fornecedor).
    pub lote: Option<String>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub cantidad: Decimal,
    pub fecha_ingreso: DateTime<Utc>,
    pub activo: bool,
}

#[derive(Debug, Clone)]
pub struct NewLote {
    pub insumo_id: Uuid,
    pub local_id: Uuid,
    pub lote: Option<String>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub cantidad: Decimal,
    pub fecha_ingreso: DateTime<Utc>,
}

// --- 3. Movimento ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movimiento_tipo", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entrada,
    Salida,
}

impl FromStr for MovementType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entrada" => Ok(MovementType::Entrada),
            "salida" => Ok(MovementType::Salida),
            other => Err(AppError::InvalidMovementType(other.to_string())),
        }
    }
}

// Registro imutável do livro-razão. Nunca é editado nem apagado.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InsumoMovimiento {
    pub id: Uuid,
    pub insumo_id: Uuid,
    pub local_id: Uuid,
    pub lote_id: Option<Uuid>,
    pub tipo: MovementType,
    pub cantidad: Decimal,
    pub motivo: Option<String>,
    pub usuario_id: Option<Uuid>,
    pub fecha: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMovimiento {
    pub insumo_id: Uuid,
    pub local_id: Uuid,
    pub lote_id: Option<Uuid>,
    pub tipo: MovementType,
    pub cantidad: Decimal,
    pub motivo: Option<String>,
    pub usuario_id: Option<Uuid>,
    pub fecha: DateTime<Utc>,
}

/// Opções de `post_movement`.
#[derive(Debug, Clone, Default)]
pub struct MovementOptions {
    pub lote_id: Option<Uuid>,
    pub lote: Option<String>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub motivo: Option<String>,
    pub usuario_id: Option<Uuid>,
}

/// Resultado de um movimento confirmado.
#[derive(Debug, Clone, Serialize)]
pub struct MovementReceipt {
    pub movimiento: InsumoMovimiento,
    pub lote: InsumoLote,
    pub insumo: Insumo,
}

// --- 4. Alertas ---
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringLot {
    pub insumo_id: Uuid,
    pub nombre: String,
    pub lote: InsumoLote,
    pub dias_restantes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlerts {
    pub bajo_stock: Vec<Insumo>,
    pub por_vencer: Vec<ExpiringLot>,
}

// As colunas de quantidade são NUMERIC(14, 3).
pub const QUANTITY_SCALE: u32 = 3;

/// Primeiro valor que não cabe em NUMERIC(14, 3).
pub fn quantity_limit() -> Decimal {
    Decimal::new(100_000_000_000, 0)
}

/// Confere que a quantidade é positiva e cabe na coluna sem arredondar.
pub fn check_quantity(value: Decimal) -> Result<Decimal, AppError> {
    let value = value.normalize();
    if value <= Decimal::ZERO || value >= quantity_limit() || value.scale() > QUANTITY_SCALE {
        return Err(AppError::InvalidQuantity);
    }
    Ok(value)
}

/// Converte a quantidade recebida (JSON number) em `Decimal`.
/// NaN, infinito, zero, negativos e mais de três casas são rejeitados.
pub fn quantity_from_f64(value: f64) -> Result<Decimal, AppError> {
    if !value.is_finite() || value <= 0.0 || value >= 1e11 {
        return Err(AppError::InvalidQuantity);
    }
    // A forma decimal mais curta do f64 é a que o cliente escreveu.
    let parsed = Decimal::from_str(&value.to_string()).map_err(|_| AppError::InvalidQuantity)?;
    check_quantity(parsed)
}
