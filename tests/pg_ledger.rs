// Livro-razão contra um Postgres de verdade.
// Rodar com: DATABASE_URL=postgres://... cargo test --test pg_ledger -- --ignored

use std::sync::Arc;

use chrono::Utc;
use insumos_backend::{
    common::error::AppError,
    db::{LedgerStore, LedgerTx, PgLedgerStore},
    models::inventory::{MovementOptions, MovementType, NewInsumo, NewLote},
    services::inventory_service::InventoryService,
};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

async fn pool() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL para os testes de Postgres");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("conexão com o Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrações");
    pool
}

// Cada teste usa um local novo, então os dados não se cruzam.
async fn new_local(pool: &PgPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO locales (nombre) VALUES ($1) RETURNING id")
        .bind(format!("local-{}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn harina(service: &InventoryService, local_id: Uuid) -> Uuid {
    service
        .create_insumo(NewInsumo {
            local_id,
            nombre: "Harina".into(),
            unidad: "kg".into(),
            stock_minimo: Decimal::ZERO,
            alerta_vencimiento_dias: 0,
        })
        .await
        .unwrap()
        .id
}

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

async fn post(
    service: &InventoryService,
    local: Uuid,
    insumo: Uuid,
    tipo: MovementType,
    cantidad: Decimal,
) -> Result<(), AppError> {
    service
        .post_movement(local, insumo, tipo, cantidad, MovementOptions::default())
        .await
        .map(|_| ())
}

#[tokio::test]
#[ignore = "precisa de Postgres em DATABASE_URL"]
async fn fifo_salida_without_partial_consumption() {
    let pool = pool().await;
    let service = InventoryService::new(Arc::new(PgLedgerStore::new(pool.clone())));
    let local = new_local(&pool).await;
    let insumo = harina(&service, local).await;

    post(&service, local, insumo, MovementType::Entrada, dec(5)).await.unwrap();
    post(&service, local, insumo, MovementType::Entrada, dec(3)).await.unwrap();
    post(&service, local, insumo, MovementType::Salida, dec(4)).await.unwrap();

    let err = post(&service, local, insumo, MovementType::Salida, dec(2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientLotQuantity { available } if available == dec(1)));

    let lots = service.list_lots(local, insumo).await.unwrap();
    let saldos: Vec<Decimal> = lots.iter().map(|l| l.cantidad).collect();
    assert_eq!(saldos, vec![dec(1), dec(3)]);
    assert_eq!(service.get_insumo(local, insumo).await.unwrap().stock_total, dec(4));
    assert_eq!(service.list_movements(local, insumo).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "precisa de Postgres em DATABASE_URL"]
async fn concurrent_salidas_never_overdraw_a_lot() {
    let pool = pool().await;
    let service = InventoryService::new(Arc::new(PgLedgerStore::new(pool.clone())));
    let local = new_local(&pool).await;
    let insumo = harina(&service, local).await;
    post(&service, local, insumo, MovementType::Entrada, dec(10)).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { post(&service, local, insumo, MovementType::Salida, dec(1)).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(AppError::NoLotAvailable) => {}
            Err(other) => panic!("erro inesperado: {other:?}"),
        }
    }
    assert_eq!(ok, 10);

    let lots = service.list_lots(local, insumo).await.unwrap();
    assert_eq!(lots[0].cantidad, Decimal::ZERO);
    assert_eq!(service.get_insumo(local, insumo).await.unwrap().stock_total, Decimal::ZERO);
    assert_eq!(service.list_movements(local, insumo).await.unwrap().len(), 11);
}

#[tokio::test]
#[ignore = "precisa de Postgres em DATABASE_URL"]
async fn lot_decrement_is_conditional() {
    let pool = pool().await;
    let store = PgLedgerStore::new(pool.clone());
    let service = InventoryService::new(Arc::new(store.clone()));
    let local = new_local(&pool).await;
    let insumo = harina(&service, local).await;

    let mut tx = store.begin().await.unwrap();
    let lot = tx
        .insert_lot(NewLote {
            insumo_id: insumo,
            local_id: local,
            lote: Some("L-1".into()),
            fecha_vencimiento: None,
            cantidad: dec(2),
            fecha_ingreso: Utc::now(),
        })
        .await
        .unwrap();

    assert!(tx.adjust_lot(lot.id, dec(-3)).await.unwrap().is_none());
    let drained = tx.adjust_lot(lot.id, dec(-2)).await.unwrap().unwrap();
    assert_eq!(drained.cantidad, Decimal::ZERO);
    tx.rollback().await.unwrap();

    // Nada ficou gravado.
    assert!(store.list_lots(local, insumo).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "precisa de Postgres em DATABASE_URL"]
async fn constraint_violations_map_to_domain_errors() {
    let pool = pool().await;
    let store = PgLedgerStore::new(pool.clone());
    let service = InventoryService::new(Arc::new(store.clone()));
    let local = new_local(&pool).await;
    let insumo = harina(&service, local).await;

    let duplicate = service
        .create_insumo(NewInsumo {
            local_id: local,
            nombre: "Harina".into(),
            unidad: "kg".into(),
            stock_minimo: Decimal::ZERO,
            alerta_vencimiento_dias: 0,
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    post(&service, local, insumo, MovementType::Entrada, dec(1)).await.unwrap();

    // Direto no store, sem a contagem prévia do serviço: a FK responde.
    let err = store.delete_insumo(local, insumo).await.unwrap_err();
    assert!(matches!(err, AppError::InsumoHasLots));
}

#[tokio::test]
#[ignore = "precisa de Postgres em DATABASE_URL"]
async fn largest_quantity_fits_the_columns() {
    let pool = pool().await;
    let service = InventoryService::new(Arc::new(PgLedgerStore::new(pool.clone())));
    let local = new_local(&pool).await;
    let insumo = harina(&service, local).await;
    let max = Decimal::new(99_999_999_999_999, 3);

    post(&service, local, insumo, MovementType::Entrada, max).await.unwrap();
    assert_eq!(service.get_insumo(local, insumo).await.unwrap().stock_total, max);

    let err = post(&service, local, insumo, MovementType::Entrada, Decimal::new(1, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity));
}
