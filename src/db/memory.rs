// src/db/memory.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ledger_store::{LedgerStore, LedgerTx, UserDirectory},
    models::{
        auth::User,
        inventory::{
            Insumo, InsumoChanges, InsumoLote, InsumoMovimiento, NewInsumo, NewLote,
            NewMovimiento,
        },
    },
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    insumos: Vec<Insumo>,
    lots: Vec<InsumoLote>,
    movements: Vec<InsumoMovimiento>,
}

/// Livro-razão em memória, para testes. Uma transação segura o mutex do
/// começo ao fim e trabalha numa cópia; o commit troca a cópia pelo estado.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryLedgerTx { guard, working }))
    }

    async fn list_insumos(&self, local_id: Uuid) -> Result<Vec<Insumo>, AppError> {
        let state = self.state.lock().await;
        let mut insumos: Vec<Insumo> = state
            .insumos
            .iter()
            .filter(|i| i.local_id == local_id)
            .cloned()
            .collect();
        insumos.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(insumos)
    }

    async fn find_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError> {
        let state = self.state.lock().await;
        Ok(state.find_insumo(local_id, insumo_id).cloned())
    }

    async fn create_insumo(&self, new: NewInsumo) -> Result<Insumo, AppError> {
        let mut state = self.state.lock().await;
        if state
            .insumos
            .iter()
            .any(|i| i.local_id == new.local_id && i.nombre == new.nombre)
        {
            return Err(AppError::Conflict(format!(
                "já existe um insumo chamado '{}'",
                new.nombre
            )));
        }

        let now = Utc::now();
        let insumo = Insumo {
            id: Uuid::new_v4(),
            local_id: new.local_id,
            nombre: new.nombre,
            unidad: new.unidad,
            stock_total: Decimal::ZERO,
            stock_minimo: new.stock_minimo,
            alerta_vencimiento_dias: new.alerta_vencimiento_dias,
            created_at: now,
            updated_at: now,
        };
        state.insumos.push(insumo.clone());
        Ok(insumo)
    }

    async fn update_insumo(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
        changes: InsumoChanges,
    ) -> Result<Option<Insumo>, AppError> {
        let mut state = self.state.lock().await;
        if let Some(nombre) = &changes.nombre {
            if state
                .insumos
                .iter()
                .any(|i| i.local_id == local_id && i.id != insumo_id && &i.nombre == nombre)
            {
                return Err(AppError::Conflict(format!(
                    "já existe um insumo chamado '{nombre}'"
                )));
            }
        }

        let Some(insumo) = state
            .insumos
            .iter_mut()
            .find(|i| i.id == insumo_id && i.local_id == local_id)
        else {
            return Ok(None);
        };
        if let Some(nombre) = changes.nombre {
            insumo.nombre = nombre;
        }
        if let Some(unidad) = changes.unidad {
            insumo.unidad = unidad;
        }
        if let Some(stock_minimo) = changes.stock_minimo {
            insumo.stock_minimo = stock_minimo;
        }
        if let Some(dias) = changes.alerta_vencimiento_dias {
            insumo.alerta_vencimiento_dias = dias;
        }
        insumo.updated_at = Utc::now();
        Ok(Some(insumo.clone()))
    }

    async fn delete_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if state.lots.iter().any(|l| l.insumo_id == insumo_id) {
            return Err(AppError::InsumoHasLots);
        }
        let before = state.insumos.len();
        state
            .insumos
            .retain(|i| !(i.id == insumo_id && i.local_id == local_id));
        Ok(state.insumos.len() < before)
    }

    async fn count_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.lock().await;
        let count = state
            .lots
            .iter()
            .filter(|l| l.insumo_id == insumo_id && l.local_id == local_id)
            .count();
        Ok(count as i64)
    }

    async fn list_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Vec<InsumoLote>, AppError> {
        let state = self.state.lock().await;
        let mut lots: Vec<InsumoLote> = state
            .lots
            .iter()
            .filter(|l| l.insumo_id == insumo_id && l.local_id == local_id)
            .cloned()
            .collect();
        // sort estável: empates ficam na ordem de criação
        lots.sort_by_key(|l| l.fecha_ingreso);
        Ok(lots)
    }

    async fn list_movements(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Vec<InsumoMovimiento>, AppError> {
        let state = self.state.lock().await;
        let mut movements: Vec<InsumoMovimiento> = state
            .movements
            .iter()
            .filter(|m| m.insumo_id == insumo_id && m.local_id == local_id)
            .cloned()
            .collect();
        // Mais recente primeiro; empates: o último gravado primeiro.
        movements.reverse();
        movements.sort_by(|a, b| b.fecha.cmp(&a.fecha));
        Ok(movements)
    }

    async fn list_lots_with_expiry(&self, local_id: Uuid) -> Result<Vec<InsumoLote>, AppError> {
        let state = self.state.lock().await;
        let mut lots: Vec<InsumoLote> = state
            .lots
            .iter()
            .filter(|l| {
                l.local_id == local_id
                    && l.activo
                    && l.cantidad > Decimal::ZERO
                    && l.fecha_vencimiento.is_some()
            })
            .cloned()
            .collect();
        lots.sort_by_key(|l| l.fecha_vencimiento);
        Ok(lots)
    }
}

impl LedgerState {
    fn find_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Option<&Insumo> {
        self.insumos
            .iter()
            .find(|i| i.id == insumo_id && i.local_id == local_id)
    }
}

pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_insumo(&mut self, local_id: Uuid, insumo_id: Uuid) -> Result<Option<Insumo>, AppError> {
        Ok(self.working.find_insumo(local_id, insumo_id).cloned())
    }

    async fn find_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
        lote_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError> {
        Ok(self
            .working
            .lots
            .iter()
            .find(|l| l.id == lote_id && l.insumo_id == insumo_id && l.local_id == local_id)
            .cloned())
    }

    async fn first_available_lot(
        &mut self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Option<InsumoLote>, AppError> {
        // min_by_key devolve o primeiro em caso de empate (ordem de criação).
        Ok(self
            .working
            .lots
            .iter()
            .filter(|l| {
                l.insumo_id == insumo_id
                    && l.local_id == local_id
                    && l.activo
                    && l.cantidad > Decimal::ZERO
            })
            .min_by_key(|l| l.fecha_ingreso)
            .cloned())
    }

    async fn insert_lot(&mut self, new: NewLote) -> Result<InsumoLote, AppError> {
        let lot = InsumoLote {
            id: Uuid::new_v4(),
            insumo_id: new.insumo_id,
            local_id: new.local_id,
            lote: new.lote,
            fecha_vencimiento: new.fecha_vencimiento,
            cantidad: new.cantidad,
            fecha_ingreso: new.fecha_ingreso,
            activo: true,
        };
        self.working.lots.push(lot.clone());
        Ok(lot)
    }

    async fn adjust_lot(&mut self, lote_id: Uuid, delta: Decimal) -> Result<Option<InsumoLote>, AppError> {
        let Some(lot) = self.working.lots.iter_mut().find(|l| l.id == lote_id) else {
            return Ok(None);
        };
        if lot.cantidad + delta < Decimal::ZERO {
            return Ok(None);
        }
        lot.cantidad += delta;
        Ok(Some(lot.clone()))
    }

    async fn set_stock_total(&mut self, insumo_id: Uuid, stock_total: Decimal) -> Result<Insumo, AppError> {
        let insumo = self
            .working
            .insumos
            .iter_mut()
            .find(|i| i.id == insumo_id)
            .ok_or(AppError::NotFound("insumo"))?;
        insumo.stock_total = stock_total;
        insumo.updated_at = Utc::now();
        Ok(insumo.clone())
    }

    async fn insert_movement(&mut self, new: NewMovimiento) -> Result<InsumoMovimiento, AppError> {
        let movement = InsumoMovimiento {
            id: Uuid::new_v4(),
            insumo_id: new.insumo_id,
            local_id: new.local_id,
            lote_id: new.lote_id,
            tipo: new.tipo,
            cantidad: new.cantidad,
            motivo: new.motivo,
            usuario_id: new.usuario_id,
            fecha: new.fecha,
        };
        self.working.movements.push(movement.clone());
        Ok(movement)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let InMemoryLedgerTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        // Descarta a cópia; o guard é liberado no drop.
        Ok(())
    }
}

/// Diretório de usuários em memória, para testes.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }
}
