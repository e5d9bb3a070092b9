// src/services/inventory_service.rs

use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{LedgerStore, LedgerTx},
    models::inventory::{
        check_quantity, quantity_limit, ExpiringLot, Insumo, InsumoChanges, InsumoLote,
        InsumoMovimiento, MovementOptions, MovementReceipt, MovementType, NewInsumo, NewLote,
        NewMovimiento, StockAlerts,
    },
};

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // --- CADASTRO ---

    pub async fn list_insumos(&self, local_id: Uuid) -> Result<Vec<Insumo>, AppError> {
        self.store.list_insumos(local_id).await
    }

    pub async fn get_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Insumo, AppError> {
        self.store
            .find_insumo(local_id, insumo_id)
            .await?
            .ok_or(AppError::NotFound("insumo"))
    }

    pub async fn create_insumo(&self, new: NewInsumo) -> Result<Insumo, AppError> {
        let insumo = self.store.create_insumo(new).await?;
        tracing::info!(local = %insumo.local_id, insumo = %insumo.id, "insumo criado: {}", insumo.nombre);
        Ok(insumo)
    }

    pub async fn update_insumo(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
        changes: InsumoChanges,
    ) -> Result<Insumo, AppError> {
        self.store
            .update_insumo(local_id, insumo_id, changes)
            .await?
            .ok_or(AppError::NotFound("insumo"))
    }

    /// Recusado enquanto existir qualquer lote, mesmo zerado: o histórico
    /// de lotes é permanente.
    pub async fn delete_insumo(&self, local_id: Uuid, insumo_id: Uuid) -> Result<(), AppError> {
        if self.store.count_lots(local_id, insumo_id).await? > 0 {
            return Err(AppError::InsumoHasLots);
        }
        if !self.store.delete_insumo(local_id, insumo_id).await? {
            return Err(AppError::NotFound("insumo"));
        }
        tracing::info!(local = %local_id, insumo = %insumo_id, "insumo excluído");
        Ok(())
    }

    // --- LEITURAS DO LIVRO-RAZÃO ---

    pub async fn list_lots(&self, local_id: Uuid, insumo_id: Uuid) -> Result<Vec<InsumoLote>, AppError> {
        self.get_insumo(local_id, insumo_id).await?;
        self.store.list_lots(local_id, insumo_id).await
    }

    pub async fn list_movements(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
    ) -> Result<Vec<InsumoMovimiento>, AppError> {
        self.get_insumo(local_id, insumo_id).await?;
        self.store.list_movements(local_id, insumo_id).await
    }

    /// Estoque baixo e lotes perto do vencimento (ou já vencidos).
    pub async fn stock_alerts(&self, local_id: Uuid) -> Result<StockAlerts, AppError> {
        self.stock_alerts_on(local_id, Utc::now().date_naive()).await
    }

    pub async fn stock_alerts_on(&self, local_id: Uuid, today: NaiveDate) -> Result<StockAlerts, AppError> {
        let insumos = self.store.list_insumos(local_id).await?;
        let lots = self.store.list_lots_with_expiry(local_id).await?;

        let by_id: HashMap<Uuid, &Insumo> = insumos.iter().map(|i| (i.id, i)).collect();

        let por_vencer = lots
            .into_iter()
            .filter_map(|lote| {
                let insumo = by_id.get(&lote.insumo_id)?;
                let vence = lote.fecha_vencimiento?;
                let limite = today + Duration::days(i64::from(insumo.alerta_vencimiento_dias));
                (vence <= limite).then(|| ExpiringLot {
                    insumo_id: insumo.id,
                    nombre: insumo.nombre.clone(),
                    dias_restantes: (vence - today).num_days(),
                    lote,
                })
            })
            .collect();

        let bajo_stock = insumos
            .iter()
            .filter(|i| i.stock_minimo > Decimal::ZERO && i.stock_total <= i.stock_minimo)
            .cloned()
            .collect();

        Ok(StockAlerts {
            bajo_stock,
            por_vencer,
        })
    }

    // --- MOVIMENTO (ENTRADA / SAÍDA) ---

    /// Lança um movimento: lote, saldo do insumo e registro no livro-razão
    /// numa única transação. Qualquer erro desfaz tudo.
    pub async fn post_movement(
        &self,
        local_id: Uuid,
        insumo_id: Uuid,
        tipo: MovementType,
        cantidad: Decimal,
        options: MovementOptions,
    ) -> Result<MovementReceipt, AppError> {
        let cantidad = check_quantity(cantidad)?;

        let mut tx = self.store.begin().await?;

        match apply_movement(tx.as_mut(), local_id, insumo_id, tipo, cantidad, options).await {
            Ok(receipt) => {
                tx.commit().await?;
                tracing::info!(
                    local = %local_id,
                    insumo = %insumo_id,
                    lote = %receipt.lote.id,
                    tipo = ?tipo,
                    %cantidad,
                    stock_total = %receipt.insumo.stock_total,
                    "movimento registrado"
                );
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("falha no rollback do movimento: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

// Ordem das escritas: lote, insumo, movimento.
async fn apply_movement(
    tx: &mut dyn LedgerTx,
    local_id: Uuid,
    insumo_id: Uuid,
    tipo: MovementType,
    cantidad: Decimal,
    options: MovementOptions,
) -> Result<MovementReceipt, AppError> {
    let insumo = tx
        .lock_insumo(local_id, insumo_id)
        .await?
        .ok_or(AppError::NotFound("insumo"))?;

    let (lote, stock_total) = match tipo {
        MovementType::Entrada => {
            // O saldo também é NUMERIC(14, 3).
            if insumo.stock_total + cantidad >= quantity_limit() {
                return Err(AppError::InvalidQuantity);
            }
            let lote = match options.lote_id {
                Some(lote_id) => {
                    let existing = tx
                        .find_lot(local_id, insumo_id, lote_id)
                        .await?
                        .ok_or(AppError::NotFound("lote"))?;
                    tx.adjust_lot(existing.id, cantidad)
                        .await?
                        .ok_or(AppError::NotFound("lote"))?
                }
                None => {
                    tx.insert_lot(NewLote {
                        insumo_id,
                        local_id,
                        lote: options.lote.clone(),
                        fecha_vencimiento: options.fecha_vencimiento,
                        cantidad,
                        fecha_ingreso: Utc::now(),
                    })
                    .await?
                }
            };
            (lote, insumo.stock_total + cantidad)
        }
        MovementType::Salida => {
            let source = match options.lote_id {
                Some(lote_id) => tx
                    .find_lot(local_id, insumo_id, lote_id)
                    .await?
                    .ok_or(AppError::NotFound("lote"))?,
                // FIFO: o lote mais antigo com saldo. Sem combinar lotes.
                None => tx
                    .first_available_lot(local_id, insumo_id)
                    .await?
                    .ok_or(AppError::NoLotAvailable)?,
            };
            if source.cantidad < cantidad {
                return Err(AppError::InsufficientLotQuantity {
                    available: source.cantidad,
                });
            }
            let lote = tx
                .adjust_lot(source.id, -cantidad)
                .await?
                .ok_or(AppError::InsufficientLotQuantity {
                    available: source.cantidad,
                })?;
            (lote, (insumo.stock_total - cantidad).max(Decimal::ZERO))
        }
    };

    let insumo = tx.set_stock_total(insumo.id, stock_total).await?;

    let movimiento = tx
        .insert_movement(NewMovimiento {
            insumo_id,
            local_id,
            lote_id: Some(lote.id),
            tipo,
            cantidad,
            motivo: options.motivo,
            usuario_id: options.usuario_id,
            fecha: Utc::now(),
        })
        .await?;

    Ok(MovementReceipt {
        movimiento,
        lote,
        insumo,
    })
}
