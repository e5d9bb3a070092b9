// src/db/inventory_repo.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ledger_store::{LedgerStore, LedgerTx},
    models::inventory::{
        Insumo, InsumoChanges, InsumoLote, InsumoMovimiento, NewInsumo, NewLote, NewMovimiento,
    },
};

// Implementação Postgres do livro-razão de insumos.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(e: sqlx::Error, nombre: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("já existe um insumo chamado '{nombre}'"));
        }
    }
    e.into()
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    // ---
    // Funções de "Leitura"
    // ---

    async fn list_insumos(&self, local_id: Uuid) -> Result<Vec<Insumo>, AppError> {
        let insumos = sqlx::query_as::<_, Insumo>(
            "SELECT * FROM insumos WHERE local_id = $1 ORDER BY nombre ASC",
        )
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(insumos)
    }

    async fn find_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError> {
        let insumo = sqlx::query_as::<_, Insumo>(
            "SELECT * FROM insumos WHERE id = $1 AND local_id = $2",
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(insumo)
    }

    async fn count_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM insumo_lotes WHERE insumo_id = $1 AND local_id = $2",
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Vec<InsumoLote>, AppError> {
        let lots = sqlx::query_as::<_, InsumoLote>(
            r#"
            SELECT * FROM insumo_lotes
            WHERE insumo_id = $1 AND local_id = $2
            ORDER BY fecha_ingreso ASC, id ASC
            "#,
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    async fn list_movements(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Vec<InsumoMovimiento>, AppError> {
        let movements = sqlx::query_as::<_, InsumoMovimiento>(
            r#"
            SELECT * FROM insumo_movimientos
            WHERE insumo_id = $1 AND local_id = $2
            ORDER BY fecha DESC, id DESC
            "#,
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }

    async fn list_lots_with_expiry(&self, local_id: Uuid) -> Result<Vec<InsumoLote>, AppError> {
        let lots = sqlx::query_as::<_, InsumoLote>(
            r#"
            SELECT * FROM insumo_lotes
            WHERE local_id = $1
              AND activo
              AND cantidad > 0
              AND fecha_vencimiento IS NOT NULL
            ORDER BY fecha_vencimiento ASC
            "#,
        )
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    // ---
    // Funções de "Escrita" do cadastro (não mexem em estoque)
    // ---

    async fn create_insumo(&self, new: NewInsumo) -> Result<Insumo, AppError> {
        sqlx::query_as::<_, Insumo>(
            r#"
            INSERT INTO insumos (local_id, nombre, unidad, stock_minimo, alerta_vencimiento_dias)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.local_id)
        .bind(&new.nombre)
        .bind(&new.unidad)
        .bind(new.stock_minimo)
        .bind(new.alerta_vencimiento_dias)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &new.nombre))
    }

    async fn update_insumo(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
        changes: InsumoChanges,
    ) -> Result<Option<Insumo>, AppError> {
        // COALESCE mantém o valor atual quando o campo não veio.
        sqlx::query_as::<_, Insumo>(
            r#"
            UPDATE insumos SET
                nombre = COALESCE($3, nombre),
                unidad = COALESCE($4, unidad),
                stock_minimo = COALESCE($5, stock_minimo),
                alerta_vencimiento_dias = COALESCE($6, alerta_vencimiento_dias),
                updated_at = NOW()
            WHERE id = $1 AND local_id = $2
            RETURNING *
            "#,
        )
        .bind(insumo_id)
        .bind(local_id)
        .bind(changes.nombre.as_deref())
        .bind(changes.unidad.as_deref())
        .bind(changes.stock_minimo)
        .bind(changes.alerta_vencimiento_dias)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, changes.nombre.as_deref().unwrap_or_default()))
    }

    async fn delete_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM insumos WHERE id = $1 AND local_id = $2")
            .bind(insumo_id)
            .bind(local_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                // ON DELETE RESTRICT nos lotes: o histórico é permanente.
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_foreign_key_violation() {
                        return AppError::InsumoHasLots;
                    }
                }
                AppError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}

// Transação Postgres. Se for descartada sem commit, o sqlx faz rollback.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_insumo(&mut self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError> {
        // FOR UPDATE serializa movimentos concorrentes do mesmo insumo.
        let insumo = sqlx::query_as::<_, Insumo>(
            "SELECT * FROM insumos WHERE id = $1 AND local_id = $2 FOR UPDATE",
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(insumo)
    }

    async fn find_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
        lote_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError> {
        let lot = sqlx::query_as::<_, InsumoLote>(
            r#"
            SELECT * FROM insumo_lotes
            WHERE id = $1 AND insumo_id = $2 AND local_id = $3
            FOR UPDATE
            "#,
        )
        .bind(lote_id)
        .bind(insumo_id)
        .bind(local_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(lot)
    }

    async fn first_available_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError> {
        let lot = sqlx::query_as::<_, InsumoLote>(
            r#"
            SELECT * FROM insumo_lotes
            WHERE insumo_id = $1 AND local_id = $2 AND activo AND cantidad > 0
            ORDER BY fecha_ingreso ASC, id ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(insumo_id)
        .bind(local_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(lot)
    }

    async fn insert_lot(&mut self, new: NewLote) -> Result<InsumoLote, AppError> {
        let lot = sqlx::query_as::<_, InsumoLote>(
            r#"
            INSERT INTO insumo_lotes (insumo_id, local_id, lote, fecha_vencimiento, cantidad, fecha_ingreso)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.insumo_id)
        .bind(new.local_id)
        .bind(new.lote)
        .bind(new.fecha_vencimiento)
        .bind(new.cantidad)
        .bind(new.fecha_ingreso)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(lot)
    }

    async fn adjust_lot(&mut self, lote_id: Uuid, delta: Decimal) -> Result<Option<InsumoLote>, AppError> {
        // Update condicional: a quantidade nunca fica negativa.
        let lot = sqlx::query_as::<_, InsumoLote>(
            r#"
            UPDATE insumo_lotes SET cantidad = cantidad + $2
            WHERE id = $1 AND cantidad + $2 >= 0
            RETURNING *
            "#,
        )
        .bind(lote_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(lot)
    }

    async fn set_stock_total(&mut self, insumo_id: Uuid, stock_total: Decimal) -> Result<Insumo, AppError> {
        let insumo = sqlx::query_as::<_, Insumo>(
            r#"
            UPDATE insumos SET stock_total = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(insumo_id)
        .bind(stock_total)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(insumo)
    }

    async fn insert_movement(&mut self, new: NewMovimiento) -> Result<InsumoMovimiento, AppError> {
        let movement = sqlx::query_as::<_, InsumoMovimiento>(
            r#"
            INSERT INTO insumo_movimientos (insumo_id, local_id, lote_id, tipo, cantidad, motivo, usuario_id, fecha)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.insumo_id)
        .bind(new.local_id)
        .bind(new.lote_id)
        .bind(new.tipo)
        .bind(new.cantidad)
        .bind(new.motivo)
        .bind(new.usuario_id)
        .bind(new.fecha)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(movement)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
