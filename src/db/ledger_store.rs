// src/db/ledger_store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        auth::User,
        inventory::{
            Insumo, InsumoChanges, InsumoLote, InsumoMovimiento, NewInsumo, NewLote,
            NewMovimiento,
        },
    },
};

/// Armazenamento do inventário. Leituras vão direto; tudo o que mexe em
/// estoque passa por uma transação (`LedgerTx`).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, AppError>;

    async fn list_insumos(&self, local_id: Uuid) -> Result<Vec<Insumo>, AppError>;

    async fn find_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError>;

    async fn create_insumo(&self, new: NewInsumo) -> Result<Insumo, AppError>;

    async fn update_insumo(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
        changes: InsumoChanges,
    ) -> Result<Option<Insumo>, AppError>;

    /// Falha com `InsumoHasLots` se existir qualquer lote do insumo.
    async fn delete_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<bool, AppError>;

    async fn count_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<i64, AppError>;

    /// Ordenados por `fecha_ingreso` crescente.
    async fn list_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Vec<InsumoLote>, AppError>;

    /// Ordenados por `fecha` decrescente.
    async fn list_movements(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Vec<InsumoMovimiento>, AppError>;

    /// Lotes ativos, com saldo e com data de vencimento, de todo o local.
    async fn list_lots_with_expiry(&self, local_id: Uuid) -> Result<Vec<InsumoLote>, AppError>;
}

/// Uma transação do livro-razão. Sem `commit`, nada é gravado.
#[async_trait]
pub trait LedgerTx: Send {
    /// Lê o insumo e o trava até o fim da transação.
    async fn lock_insumo(&mut self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError>;

    async fn find_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
        lote_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError>;

    /// Lote ativo com saldo positivo e `fecha_ingreso` mais antiga (FIFO).
    async fn first_available_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError>;

    async fn insert_lot(&mut self, new: NewLote) -> Result<InsumoLote, AppError>;

    /// Soma `delta` à quantidade do lote. `None` se o resultado ficaria
    /// negativo (nada é alterado nesse caso).
    async fn adjust_lot(
        &mut self,
        lote_id: Uuid,
        delta: rust_decimal::Decimal,
    ) -> Result<Option<InsumoLote>, AppError>;

    async fn set_stock_total(
        &mut self,
        insumo_id: Uuid,
        stock_total: rust_decimal::Decimal,
    ) -> Result<Insumo, AppError>;

    async fn insert_movement(&mut self, new: NewMovimiento) -> Result<InsumoMovimiento, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Busca de usuários para o login.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}
